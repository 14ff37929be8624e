//! ChatCmd message-command subsystem
//!
//! This crate turns rich-text chat messages into command invocations and
//! renders the results. Messages are tokenized into lines of atoms, resolved
//! in two phases (embedded commands first, then line-owning commands) and
//! rendered into an inline embedding view and a unified response.
//!
//! # Examples
//!
//! ```ignore
//! use chatcmd_commands::{
//!     handler_fn, CommandDescriptor, CommandManager, CommandRegistry, InMemorySettings,
//!     InboundMessage, Outcome, Scope,
//! };
//! use std::sync::Arc;
//!
//! let mut registry = CommandRegistry::new();
//!
//! // Register a command
//! registry.register(
//!     CommandDescriptor::new("echo", "Echo", handler_fn(|_, args| {
//!         let words: Vec<String> = args.iter().filter_map(|a| a.text()).collect();
//!         Ok(Outcome::Text(words.join(" ")))
//!     }))
//!     .with_description("Repeat the arguments"),
//! )?;
//!
//! // Process a message
//! let manager = CommandManager::new(registry, Arc::new(InMemorySettings::default()));
//! let output = manager
//!     .process(InboundMessage::text(1, Scope::Group(1), "/echo hello"))
//!     .await?;
//! ```

pub mod argument;
pub mod atom;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod manager;
pub mod output_injection;
pub mod preview;
pub mod registry;
pub mod settings;
pub mod tokenizer;
pub mod types;

pub use argument::{ArgOption, ArgumentView};
pub use atom::{message_as_raw, Atom, CompactComplex, ExecutedCommand, Group, Line, Part, UnexecutedCommand};
pub use config::{CommandsConfig, ConfigManager};
pub use context::{ExecuteContext, InvocationContext, InvocationId, LineInfo, MessageContext, SlotId};
pub use error::{CommandError, Result};
pub use evaluator::Evaluator;
pub use executor::{handler_fn, CommandHandler, FnHandler};
pub use manager::{CommandManager, InboundMessage};
pub use output_injection::{OutputInjectionConfig, OutputInjector, RenderedOutput, ResponseBlock};
pub use preview::preview_pieces;
pub use registry::CommandRegistry;
pub use settings::{InMemorySettings, SettingsStore};
pub use tokenizer::Tokenizer;
pub use types::{
    normalize_pieces, ArgumentStartPolicy, CommandDescriptor, CommandResult, CommandStyle,
    CommandStyles, Note, NoteLevel, Outcome, Piece, Scope,
};
