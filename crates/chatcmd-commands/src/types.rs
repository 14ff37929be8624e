use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::executor::CommandHandler;

/// One atom of an inbound rich-text message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Piece {
    /// A run of plain text
    Text(String),

    /// A mention of a user
    Mention { target: u64 },

    /// A platform emoticon
    Emoticon { id: u32, name: String },

    /// An image attachment
    Image { url: String },

    /// Marker referencing a quoted (replied-to) message
    Quote { message_id: i64 },
}

impl Piece {
    /// Create a text piece
    pub fn text(text: impl Into<String>) -> Self {
        Piece::Text(text.into())
    }

    /// Borrow the text of a text piece
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Piece::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether this is a text piece
    pub fn is_text(&self) -> bool {
        matches!(self, Piece::Text(_))
    }
}

/// Append a piece, merging it into a trailing text piece and dropping empty text
pub fn push_piece(pieces: &mut Vec<Piece>, piece: Piece) {
    if let Piece::Text(text) = &piece {
        if text.is_empty() {
            return;
        }
        if let Some(Piece::Text(last)) = pieces.last_mut() {
            last.push_str(text);
            return;
        }
    }
    pieces.push(piece);
}

/// Merge adjacent text pieces and drop empty ones
pub fn normalize_pieces(pieces: impl IntoIterator<Item = Piece>) -> Vec<Piece> {
    let mut out = Vec::new();
    for piece in pieces {
        push_piece(&mut out, piece);
    }
    out
}

/// Resolve `\{`, `\}` and `\\` escapes; any other backslash is kept
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '{' | '}' | '\\') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Where a command invocation appears in a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStyle {
    /// Owns a whole line: `/cmd args`
    Line,

    /// Sits inside a bracket group: `{/cmd args}`
    Embedded,
}

impl fmt::Display for CommandStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStyle::Line => write!(f, "line"),
            CommandStyle::Embedded => write!(f, "embedded"),
        }
    }
}

/// Set of styles a command supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStyles {
    pub line: bool,
    pub embedded: bool,
}

impl CommandStyles {
    pub const LINE: Self = Self {
        line: true,
        embedded: false,
    };
    pub const EMBEDDED: Self = Self {
        line: false,
        embedded: true,
    };
    pub const BOTH: Self = Self {
        line: true,
        embedded: true,
    };

    pub fn contains(&self, style: CommandStyle) -> bool {
        match style {
            CommandStyle::Line => self.line,
            CommandStyle::Embedded => self.embedded,
        }
    }
}

impl Default for CommandStyles {
    fn default() -> Self {
        Self::BOTH
    }
}

/// Whether arguments may start immediately after the keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgumentStartPolicy {
    /// Whitespace must separate the keyword from the first argument
    RequiresGap,

    /// The first argument may be glued to the keyword
    #[default]
    Unrestricted,
}

/// A registered command
#[derive(Clone)]
pub struct CommandDescriptor {
    /// Keyword typed after the prefix
    pub keyword: String,

    /// Human-readable name
    pub display_name: String,

    /// Description of what the command does
    pub description: String,

    /// Styles this command may be invoked in
    pub styles: CommandStyles,

    /// Argument-start policy
    pub argument_start: ArgumentStartPolicy,

    /// Only runs as the sole owner command of a message
    pub exclusive: bool,

    /// Still runs while the bot is disabled in a scope
    pub runs_while_disabled: bool,

    /// Callback invoked for this keyword
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
    /// Create a new command descriptor
    pub fn new(
        keyword: impl Into<String>,
        display_name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            display_name: display_name.into(),
            description: String::new(),
            styles: CommandStyles::BOTH,
            argument_start: ArgumentStartPolicy::Unrestricted,
            exclusive: false,
            runs_while_disabled: false,
            handler,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the supported styles
    pub fn with_styles(mut self, styles: CommandStyles) -> Self {
        self.styles = styles;
        self
    }

    /// Set the argument-start policy
    pub fn with_argument_start(mut self, policy: ArgumentStartPolicy) -> Self {
        self.argument_start = policy;
        self
    }

    /// Set exclusivity
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Set whether the command runs while the bot is disabled
    pub fn with_runs_while_disabled(mut self, runs: bool) -> Self {
        self.runs_while_disabled = runs;
        self
    }

    /// Whether this command may be invoked in `style` with the given spacing
    pub fn accepts(&self, style: CommandStyle, squeezed: bool) -> bool {
        self.styles.contains(style)
            && !(squeezed && self.argument_start == ArgumentStartPolicy::RequiresGap)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("keyword", &self.keyword)
            .field("display_name", &self.display_name)
            .field("styles", &self.styles)
            .field("argument_start", &self.argument_start)
            .field("exclusive", &self.exclusive)
            .field("runs_while_disabled", &self.runs_while_disabled)
            .finish_non_exhaustive()
    }
}

// Keywords are unique within a registry.
impl PartialEq for CommandDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.keyword == other.keyword
    }
}

/// Severity of a note attached to an executed command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteLevel {
    UserError,
    SystemError,
    SystemWarn,
}

/// A diagnostic attached to an executed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub level: NoteLevel,
    pub content: String,
}

impl Note {
    pub fn user_error(content: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::UserError,
            content: content.into(),
        }
    }

    pub fn system_error(content: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::SystemError,
            content: content.into(),
        }
    }

    pub fn system_warn(content: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::SystemWarn,
            content: content.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level, NoteLevel::UserError | NoteLevel::SystemError)
    }
}

/// Structured result of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Inline substitute at the invocation site (required for embedded style)
    pub embedding: Option<Vec<Piece>>,

    /// Reply contributed to the unified response
    pub response: Option<Vec<Piece>>,

    /// Opaque payload other handlers may inspect when this result is an argument
    pub embedding_raw: Option<serde_json::Value>,
}

impl CommandResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the embedding
    pub fn with_embedding(mut self, embedding: Vec<Piece>) -> Self {
        self.embedding = Some(normalize_pieces(embedding));
        self
    }

    /// Set the embedding to a single text piece
    pub fn with_embedded_text(self, text: impl Into<String>) -> Self {
        self.with_embedding(vec![Piece::Text(text.into())])
    }

    /// Set the response
    pub fn with_response(mut self, response: Vec<Piece>) -> Self {
        self.response = Some(normalize_pieces(response));
        self
    }

    /// Set the response to a single text piece
    pub fn with_response_text(self, text: impl Into<String>) -> Self {
        self.with_response(vec![Piece::Text(text.into())])
    }

    /// Attach an opaque payload
    pub fn with_embedding_raw(mut self, raw: serde_json::Value) -> Self {
        self.embedding_raw = Some(raw);
        self
    }
}

/// What a handler returned
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing; a no-match unless the handler claimed execution
    Empty,

    /// Explicit error meant for the end user
    Error(String),

    /// Plain text content
    Text(String),

    /// Rich content
    Pieces(Vec<Piece>),

    /// Structured result
    Record(CommandResult),
}

/// Conversation a message was received in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Scope {
    Group(u64),
    Private(u64),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Group(id) => write!(f, "group:{}", id),
            Scope::Private(id) => write!(f, "private:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_merges_text() {
        let pieces = normalize_pieces(vec![
            Piece::text("a"),
            Piece::text(""),
            Piece::text("b"),
            Piece::Mention { target: 1 },
            Piece::text("c"),
        ]);
        assert_eq!(
            pieces,
            vec![
                Piece::text("ab"),
                Piece::Mention { target: 1 },
                Piece::text("c")
            ]
        );
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\{b\}c\\d"), r"a{b}c\d");
        assert_eq!(unescape(r"\n stays"), r"\n stays");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_styles_contains() {
        assert!(CommandStyles::BOTH.contains(CommandStyle::Line));
        assert!(!CommandStyles::LINE.contains(CommandStyle::Embedded));
        assert!(CommandStyles::EMBEDDED.contains(CommandStyle::Embedded));
    }

    #[test]
    fn test_piece_serde_shape() {
        let json = serde_json::to_value(Piece::Mention { target: 42 }).unwrap();
        assert_eq!(json["type"], "mention");
        assert_eq!(json["data"]["target"], 42);

        let back: Piece = serde_json::from_value(json).unwrap();
        assert_eq!(back, Piece::Mention { target: 42 });
    }

    #[test]
    fn test_command_result_builder() {
        let result = CommandResult::new()
            .with_embedded_text("4")
            .with_response_text("square of 2 is 4");
        assert_eq!(result.embedding, Some(vec![Piece::text("4")]));
        assert_eq!(result.response, Some(vec![Piece::text("square of 2 is 4")]));
        assert!(result.embedding_raw.is_none());
    }
}
