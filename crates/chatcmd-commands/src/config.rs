use crate::error::{CommandError, Result};
use crate::output_injection::OutputInjectionConfig;
use crate::preview::DEFAULT_PREVIEW_UNITS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration of the message-command pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Prefix used when a scope has none configured
    pub default_prefix: String,

    /// Marker between prefix and keyword flagging an await invocation
    pub await_marker: Option<String>,

    /// Preview budget in preview units
    pub preview_units: usize,

    /// Shown to users in place of any system error
    pub system_error_message: String,

    /// Text placed before each response block's preview
    pub preview_marker: String,

    /// Text placed between response blocks
    pub block_separator: String,

    /// The bot's own user id; a leading mention of it is stripped
    pub bot_id: Option<u64>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        let output = OutputInjectionConfig::default();
        Self {
            default_prefix: "/".to_string(),
            await_marker: Some("~".to_string()),
            preview_units: DEFAULT_PREVIEW_UNITS,
            system_error_message: output.system_error_message,
            preview_marker: output.preview_marker,
            block_separator: output.block_separator,
            bot_id: None,
        }
    }
}

impl CommandsConfig {
    /// Rendering settings
    pub fn output_config(&self) -> OutputInjectionConfig {
        OutputInjectionConfig {
            preview_units: self.preview_units,
            preview_marker: self.preview_marker.clone(),
            block_separator: self.block_separator.clone(),
            system_error_message: self.system_error_message.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.default_prefix.is_empty() || self.default_prefix.chars().any(char::is_whitespace) {
            return Err(CommandError::ConfigError(
                "default_prefix must be non-empty and contain no whitespace".to_string(),
            ));
        }
        if let Some(marker) = &self.await_marker {
            if marker.is_empty() || marker.chars().any(char::is_whitespace) {
                return Err(CommandError::ConfigError(
                    "await_marker must be non-empty and contain no whitespace".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Pipeline configuration manager
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a YAML file
    pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<CommandsConfig> {
        let content = fs::read_to_string(path)?;

        let config: CommandsConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<CommandsConfig> {
        let content = fs::read_to_string(path)?;

        let config: CommandsConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file (auto-detect format)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<CommandsConfig> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension {
            "yaml" | "yml" => Self::load_from_yaml(path),
            "json" => Self::load_from_json(path),
            _ => Err(CommandError::ConfigError(
                "Unsupported file format. Use .yaml, .yml, or .json".to_string(),
            )),
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml<P: AsRef<Path>>(config: &CommandsConfig, path: P) -> Result<()> {
        let content = serde_yaml::to_string(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save_to_json<P: AsRef<Path>>(config: &CommandsConfig, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Save configuration to a file (auto-detect format)
    pub fn save_to_file<P: AsRef<Path>>(config: &CommandsConfig, path: P) -> Result<()> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension {
            "yaml" | "yml" => Self::save_to_yaml(config, path),
            "json" => Self::save_to_json(config, path),
            _ => Err(CommandError::ConfigError(
                "Unsupported file format. Use .yaml, .yml, or .json".to_string(),
            )),
        }
    }
}
