use crate::atom::Line;
use crate::config::{CommandsConfig, ConfigManager};
use crate::context::{ExecuteContext, MessageContext};
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::output_injection::{OutputInjector, RenderedOutput};
use crate::registry::CommandRegistry;
use crate::settings::SettingsStore;
use crate::tokenizer::Tokenizer;
use crate::types::{normalize_pieces, CommandDescriptor, Piece, Scope};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A message as delivered by the chat gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: u64,
    pub scope: Scope,
    pub pieces: Vec<Piece>,
}

impl InboundMessage {
    pub fn new(sender: u64, scope: Scope, pieces: Vec<Piece>) -> Self {
        Self {
            sender,
            scope,
            pieces,
        }
    }

    /// A message consisting of one text piece
    pub fn text(sender: u64, scope: Scope, text: impl Into<String>) -> Self {
        Self::new(sender, scope, vec![Piece::Text(text.into())])
    }
}

/// High-level entry point turning inbound messages into bot output
pub struct CommandManager {
    registry: CommandRegistry,
    config: CommandsConfig,
    settings: Arc<dyn SettingsStore>,
}

impl CommandManager {
    /// Create a new command manager
    pub fn new(registry: CommandRegistry, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            registry,
            config: CommandsConfig::default(),
            settings,
        }
    }

    /// Create a command manager with configuration read from a file
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        registry: CommandRegistry,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        let config = ConfigManager::load_from_file(path)?;
        Ok(Self::new(registry, settings).with_config(config))
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: CommandsConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &CommandsConfig {
        &self.config
    }

    /// Get the registry
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Get a mutable reference to the registry
    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Register a new command
    pub fn register_command(&mut self, command: CommandDescriptor) -> Result<()> {
        self.registry.register(command)
    }

    /// Get command details
    pub fn get_command(&self, keyword: &str) -> Result<Arc<CommandDescriptor>> {
        self.registry.get(keyword)
    }

    /// List all commands
    pub fn list_commands(&self) -> Vec<Arc<CommandDescriptor>> {
        self.registry.list_all()
    }

    /// Search for commands
    pub fn search_commands(&self, query: &str) -> Vec<Arc<CommandDescriptor>> {
        self.registry.search(query)
    }

    /// Remove a leading quote marker and a leading mention of the bot
    ///
    /// Returns the quoted message id, if any, and the remaining pieces.
    pub fn strip_addressing(&self, pieces: &[Piece]) -> (Option<i64>, Vec<Piece>) {
        let mut pieces = normalize_pieces(pieces.iter().cloned());
        let mut quote = None;

        if let Some(Piece::Quote { message_id }) = pieces.first() {
            quote = Some(*message_id);
            pieces.remove(0);
            trim_leading_whitespace(&mut pieces);
        }

        if let Some(bot_id) = self.config.bot_id {
            if matches!(pieces.first(), Some(Piece::Mention { target }) if *target == bot_id) {
                pieces.remove(0);
                trim_leading_whitespace(&mut pieces);
            }
        }

        (quote, pieces)
    }

    /// Tokenize pieces with the given prefix
    pub fn tokenize(&self, pieces: &[Piece], prefix: &str) -> Vec<Line> {
        Tokenizer::new(&self.registry, prefix, self.config.await_marker.as_deref()).tokenize(pieces)
    }

    /// Run one inbound message through tokenization, evaluation and rendering
    ///
    /// Returns `None` when the message produced neither an embedding nor a reply.
    pub async fn process(&self, message: InboundMessage) -> Result<Option<RenderedOutput>> {
        let (quote, pieces) = self.strip_addressing(&message.pieces);
        let prefix = self
            .settings
            .get_prefix(message.scope)
            .await?
            .unwrap_or_else(|| self.config.default_prefix.clone());
        let disabled = self.settings.is_activity_disabled(message.scope).await?;

        let lines = self.tokenize(&pieces, &prefix);
        if disabled {
            debug!(scope = %message.scope, "Activity disabled, running in degraded mode");
        }

        let mut message_context = MessageContext::new(message.sender, message.scope);
        if let Some(message_id) = quote {
            message_context = message_context.with_quote(message_id);
        }
        let mut ctx = ExecuteContext::new(message_context);
        let lines = Evaluator::new()
            .with_disabled(disabled)
            .evaluate(&mut ctx, lines)
            .await;

        let output = OutputInjector::render(&lines, &self.config.output_config());
        info!(
            scope = %message.scope,
            slots = ctx.slot_count(),
            invocations = ctx.invocation_count(),
            embedding = output.embedding.is_some(),
            response = output.response.is_some(),
            "Processed message"
        );

        Ok((!output.is_empty()).then_some(output))
    }
}

fn trim_leading_whitespace(pieces: &mut Vec<Piece>) {
    if let Some(Piece::Text(text)) = pieces.first_mut() {
        *text = text.trim_start().to_string();
    }
    *pieces = normalize_pieces(std::mem::take(pieces));
}
