//! Rendering of a resolved message into gateway output
//!
//! Two views are produced. The embedding view is the message text with every
//! embedded command replaced by its inline value. The response view is the
//! unified reply built from owner command responses and command failures.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::atom::{Atom, ExecutedCommand, Line, Part};
use crate::evaluator::executed_commands;
use crate::preview::DEFAULT_PREVIEW_UNITS;
use crate::types::{push_piece, unescape, CommandStyle, NoteLevel, Piece};

const EMBED_OPEN: &str = "«";
const EMBED_CLOSE: &str = "»";
const EMBED_FAILED: &str = "⇒error";

/// Rendering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputInjectionConfig {
    /// Preview budget in preview units
    pub preview_units: usize,

    /// Text placed before each block's invocation preview
    pub preview_marker: String,

    /// Text placed between response blocks
    pub block_separator: String,

    /// Shown in place of any system error
    pub system_error_message: String,
}

impl Default for OutputInjectionConfig {
    fn default() -> Self {
        Self {
            preview_units: DEFAULT_PREVIEW_UNITS,
            preview_marker: "> ".to_string(),
            block_separator: "\n\n".to_string(),
            system_error_message: "Something went wrong while running this command.".to_string(),
        }
    }
}

/// Output handed to the messaging gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedOutput {
    /// Message text with embedded values substituted
    pub embedding: Option<Vec<Piece>>,

    /// Unified reply
    pub response: Option<Vec<Piece>>,
}

impl RenderedOutput {
    pub fn is_empty(&self) -> bool {
        self.embedding.is_none() && self.response.is_none()
    }
}

/// One contribution to the unified reply
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBlock {
    pub command: Arc<ExecutedCommand>,
    /// 1-based line the command sits on
    pub line_number: usize,
    pub content: Vec<Piece>,
}

impl ResponseBlock {
    pub fn is_owner(&self) -> bool {
        self.command.style == CommandStyle::Line
    }
}

/// Renders resolved lines
pub struct OutputInjector;

impl OutputInjector {
    /// Render both views of a resolved message
    pub fn render(lines: &[Line], config: &OutputInjectionConfig) -> RenderedOutput {
        let executed = executed_commands(lines);
        let has_embedded = executed
            .iter()
            .any(|(_, cmd)| cmd.style == CommandStyle::Embedded);

        let embedding = has_embedded.then(|| Self::render_embedding(lines));
        let blocks = Self::response_blocks(lines, config);
        let response = Self::render_response(&blocks, has_embedded, config);

        RenderedOutput {
            embedding,
            response,
        }
    }

    /// Embedding view of all lines, joined by linefeeds
    pub fn render_embedding(lines: &[Line]) -> Vec<Piece> {
        let mut writer = EmbeddedWriter::default();
        for (idx, line) in lines.iter().enumerate() {
            if idx > 0 {
                writer.end_line();
            }
            for atom in &line.atoms {
                writer.write_atom(atom);
            }
        }
        writer.out
    }

    /// Inline rendering of a single resolved atom
    pub fn generate_embedded_output(atom: &Atom) -> Vec<Piece> {
        let mut writer = EmbeddedWriter::default();
        writer.write_atom(atom);
        writer.out
    }

    /// Response blocks in source order
    pub fn response_blocks(lines: &[Line], config: &OutputInjectionConfig) -> Vec<ResponseBlock> {
        executed_commands(lines)
            .into_iter()
            .filter_map(|(line_number, command)| {
                let content = match command.error() {
                    Some(note) if note.level == NoteLevel::SystemError => {
                        vec![Piece::text(config.system_error_message.as_str())]
                    }
                    Some(note) => vec![Piece::text(note.content.as_str())],
                    None if command.style == CommandStyle::Line => command.result.response.clone()?,
                    None => return None,
                };
                Some(ResponseBlock {
                    command,
                    line_number,
                    content,
                })
            })
            .collect()
    }

    /// Join blocks into the unified reply
    ///
    /// A single block from an owner on the first line is sent bare when no
    /// embedded command ran; otherwise every block gets a preview header.
    pub fn render_response(
        blocks: &[ResponseBlock],
        has_embedded: bool,
        config: &OutputInjectionConfig,
    ) -> Option<Vec<Piece>> {
        match blocks {
            [] => None,
            [block] if block.is_owner() && block.line_number == 1 && !has_embedded => {
                Some(block.content.clone())
            }
            _ => {
                let mut out = Vec::new();
                for (idx, block) in blocks.iter().enumerate() {
                    if idx > 0 {
                        push_piece(&mut out, Piece::text(config.block_separator.as_str()));
                    }
                    push_piece(&mut out, Piece::text(config.preview_marker.as_str()));
                    push_piece(
                        &mut out,
                        Piece::Text(block.command.generate_preview(config.preview_units)),
                    );
                    push_piece(&mut out, Piece::text("\n"));
                    for piece in &block.content {
                        push_piece(&mut out, piece.clone());
                    }
                }
                Some(out)
            }
        }
    }
}

#[derive(Default)]
struct EmbeddedWriter {
    out: Vec<Piece>,
    pad_next: bool,
}

impl EmbeddedWriter {
    fn end_line(&mut self) {
        self.pad_next = false;
        push_piece(&mut self.out, Piece::text("\n"));
    }

    fn push(&mut self, piece: Piece) {
        if let Piece::Text(text) = &piece {
            if text.is_empty() {
                return;
            }
        }
        if self.pad_next {
            self.pad_next = false;
            let starts_with_space = piece
                .as_text()
                .and_then(|text| text.chars().next())
                .is_some_and(char::is_whitespace);
            if !starts_with_space {
                push_piece(&mut self.out, Piece::text(" "));
            }
        }
        push_piece(&mut self.out, piece);
    }

    fn push_str(&mut self, text: &str) {
        self.push(Piece::text(text));
    }

    fn ends_with_space(&self) -> bool {
        match self.out.last() {
            None => true,
            Some(Piece::Text(text)) => text.chars().last().map_or(true, char::is_whitespace),
            Some(_) => false,
        }
    }

    fn write_parts(&mut self, parts: &[Part]) {
        for part in parts {
            self.write_atom(&part.atom);
            self.push_str(&part.gap);
        }
    }

    fn write_atom(&mut self, atom: &Atom) {
        match atom {
            Atom::Plain(Piece::Text(text)) => self.push_str(&unescape(text)),
            Atom::Plain(piece) => self.push(piece.clone()),
            Atom::Group(group) => {
                self.push_str("{");
                self.push_str(&group.left_pad);
                self.write_parts(&group.parts);
                self.push_str("}");
            }
            Atom::Compact(compact) => {
                for inner in &compact.parts {
                    self.write_atom(inner);
                }
            }
            Atom::Command(_) => {
                for piece in atom.as_raw() {
                    self.push(piece);
                }
            }
            Atom::Executed(cmd) if cmd.style == CommandStyle::Line => {
                self.push_str(&cmd.prefix);
                if let Some(marker) = &cmd.await_marker {
                    self.push_str(marker);
                }
                self.push_str(cmd.keyword());
                self.push_str(&cmd.head_gap);
                self.write_parts(&cmd.arguments);
            }
            Atom::Executed(cmd) => self.write_embedded(cmd),
        }
    }

    fn write_embedded(&mut self, cmd: &ExecutedCommand) {
        let pad_before = !self.pad_next && !self.ends_with_space();
        if pad_before {
            self.push_str(" ");
        }
        self.push_str(EMBED_OPEN);
        if cmd.has_failed {
            self.push_str(&format!("{}{}{}", cmd.prefix, cmd.keyword(), EMBED_FAILED));
        } else if let Some(embedding) = &cmd.result.embedding {
            for piece in embedding {
                self.push(piece.clone());
            }
        }
        self.push_str(EMBED_CLOSE);
        self.pad_next = true;
    }
}
