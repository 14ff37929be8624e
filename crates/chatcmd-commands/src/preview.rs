//! Width-bounded invocation previews used as response block headers
//!
//! Widths are counted in preview units: an ASCII character is half a unit,
//! any other character one unit, a mention three units.

use crate::atom::{ExecutedCommand, UnexecutedCommand};
use crate::types::Piece;

/// Default preview budget in units
pub const DEFAULT_PREVIEW_UNITS: usize = 10;

const ELLIPSIS: char = '…';
const MENTION_HALF_UNITS: usize = 6;

impl ExecutedCommand {
    /// Preview of this invocation within `units` preview units
    pub fn generate_preview(&self, units: usize) -> String {
        preview_pieces(&self.invocation_raw(), units)
    }
}

impl UnexecutedCommand {
    /// Preview of this invocation within `units` preview units
    pub fn generate_preview(&self, units: usize) -> String {
        preview_pieces(&self.invocation_raw(), units)
    }
}

/// Render pieces within `units` preview units
///
/// Whitespace runs collapse to one space. Emoticons render as `[name]`.
/// Images and quote markers cannot be previewed; the preview stops there with
/// an ellipsis, as it does on overflow.
pub fn preview_pieces(pieces: &[Piece], units: usize) -> String {
    let mut writer = PreviewWriter::new(units * 2);
    for piece in pieces {
        let complete = match piece {
            Piece::Text(text) => writer.push_str(text),
            Piece::Mention { target } => writer.push_mention(*target),
            Piece::Emoticon { name, .. } => writer.push_str(&format!("[{}]", name)),
            Piece::Image { .. } | Piece::Quote { .. } => false,
        };
        if !complete {
            return writer.finish(true);
        }
    }
    writer.finish(false)
}

struct PreviewWriter {
    out: String,
    used: usize,
    budget: usize,
    pending_space: bool,
}

impl PreviewWriter {
    fn new(budget: usize) -> Self {
        Self {
            out: String::new(),
            used: 0,
            budget,
            pending_space: false,
        }
    }

    /// Returns false once the budget is exhausted
    fn push_str(&mut self, text: &str) -> bool {
        for ch in text.chars() {
            if ch.is_whitespace() {
                self.pending_space = !self.out.is_empty();
                continue;
            }
            let cost = if ch.is_ascii() { 1 } else { 2 };
            if !self.push_space() || !self.reserve(cost) {
                return false;
            }
            self.out.push(ch);
        }
        true
    }

    fn push_mention(&mut self, target: u64) -> bool {
        if !self.push_space() || !self.reserve(MENTION_HALF_UNITS) {
            return false;
        }
        self.out.push('@');
        self.out.push_str(&target.to_string());
        true
    }

    fn push_space(&mut self) -> bool {
        if !self.pending_space {
            return true;
        }
        self.pending_space = false;
        if !self.reserve(1) {
            return false;
        }
        self.out.push(' ');
        true
    }

    fn reserve(&mut self, cost: usize) -> bool {
        if self.used + cost > self.budget {
            return false;
        }
        self.used += cost;
        true
    }

    fn finish(mut self, truncated: bool) -> String {
        if truncated {
            let trimmed = self.out.trim_end().len();
            self.out.truncate(trimmed);
            self.out.push(ELLIPSIS);
        }
        self.out
    }
}
