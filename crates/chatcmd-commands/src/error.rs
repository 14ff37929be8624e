use thiserror::Error;

use crate::context::SlotId;

/// Errors that can occur in the commands system
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command already registered: {0}")]
    DuplicateKeyword(String),

    #[error("Invalid command keyword: {0:?}")]
    InvalidKeyword(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Slot {0} has already been filled")]
    SlotAlreadyFilled(SlotId),

    #[error("Slot {0} was never allocated")]
    UnknownSlot(SlotId),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;
