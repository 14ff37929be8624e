//! Read-only typed view over a resolved argument
//!
//! Accessors never fail loudly: a value of the wrong kind, a failed nested
//! command, or unparsable text all yield `None`.

use std::sync::Arc;

use crate::atom::{glue, Atom, ExecutedCommand};
use crate::types::{unescape, Piece};

/// A resolved argument as seen by a command handler
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentView {
    atom: Atom,
}

/// A `key` or `key=value` argument
#[derive(Debug, Clone, PartialEq)]
pub struct ArgOption {
    pub key: String,
    pub value: Option<ArgumentView>,
}

impl ArgumentView {
    pub fn new(atom: Atom) -> Self {
        Self { atom }
    }

    /// The underlying atom
    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    /// Source pieces of this argument
    pub fn raw(&self) -> Vec<Piece> {
        self.atom.as_raw()
    }

    /// The single value this argument reduces to
    ///
    /// Single-part groups are unwrapped; multi-part groups and compacts
    /// flatten to text when every part is text-reducible. A successful
    /// embedded command stands for its one output piece.
    pub fn sole(&self) -> Option<Piece> {
        sole_of(&self.atom)
    }

    pub fn text(&self) -> Option<String> {
        match self.sole()? {
            Piece::Text(text) => Some(text),
            _ => None,
        }
    }

    /// A finite floating-point number
    pub fn number(&self) -> Option<f64> {
        let value: f64 = self.text()?.trim().parse().ok()?;
        value.is_finite().then_some(value)
    }

    /// An integer; values beyond 128 bits are rejected
    pub fn bigint(&self) -> Option<i128> {
        self.text()?.trim().parse().ok()
    }

    pub fn boolean(&self) -> Option<bool> {
        match self.text()?.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "on" => Some(true),
            "false" | "no" | "n" | "off" => Some(false),
            _ => None,
        }
    }

    /// Mentioned user id
    pub fn mention(&self) -> Option<u64> {
        match self.sole()? {
            Piece::Mention { target } => Some(target),
            _ => None,
        }
    }

    /// Emoticon id
    pub fn emoticon(&self) -> Option<u32> {
        match self.sole()? {
            Piece::Emoticon { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Image url
    pub fn image(&self) -> Option<String> {
        match self.sole()? {
            Piece::Image { url } => Some(url),
            _ => None,
        }
    }

    /// The executed command this argument consists of
    pub fn nested_command(&self) -> Option<&Arc<ExecutedCommand>> {
        match unwrap_groups(&self.atom) {
            Atom::Executed(cmd) => Some(cmd),
            _ => None,
        }
    }

    /// Opaque payload of a nested command
    pub fn embedding_raw(&self) -> Option<&serde_json::Value> {
        self.nested_command()?.result.embedding_raw.as_ref()
    }

    /// Parse `key` or `key=value`, splitting on the first `=`
    pub fn option(&self) -> Option<ArgOption> {
        let atom = unwrap_groups(&self.atom);
        match atom {
            Atom::Plain(Piece::Text(text)) => return split_option(text, Vec::new()),
            Atom::Compact(compact) => {
                if let Some((Atom::Plain(Piece::Text(text)), rest)) = compact.parts.split_first() {
                    if text.contains('=') {
                        return split_option(text, rest.to_vec());
                    }
                }
            }
            _ => {}
        }
        let text = self.text()?;
        split_option(&text, Vec::new())
    }

    /// A valueless option starting with `-`, returned without its dashes
    pub fn flag(&self) -> Option<String> {
        let option = self.option()?;
        if option.value.is_some() || !option.key.starts_with('-') {
            return None;
        }
        let key = option.key.trim_start_matches('-');
        (!key.is_empty()).then(|| key.to_string())
    }
}

fn unwrap_groups(atom: &Atom) -> &Atom {
    match atom {
        Atom::Group(group) if group.parts.len() == 1 => unwrap_groups(&group.parts[0].atom),
        other => other,
    }
}

fn sole_of(atom: &Atom) -> Option<Piece> {
    match atom {
        Atom::Plain(Piece::Text(text)) => Some(Piece::Text(unescape(text))),
        Atom::Plain(piece) => Some(piece.clone()),
        Atom::Group(group) if group.parts.len() == 1 => sole_of(&group.parts[0].atom),
        Atom::Group(group) => {
            let last = group.parts.len().saturating_sub(1);
            let mut out = String::new();
            for (idx, part) in group.parts.iter().enumerate() {
                out.push_str(&sole_text(&part.atom)?);
                if idx < last {
                    out.push_str(&part.gap);
                }
            }
            Some(Piece::Text(out))
        }
        Atom::Compact(compact) => {
            let mut out = String::new();
            for part in &compact.parts {
                out.push_str(&sole_text(part)?);
            }
            Some(Piece::Text(out))
        }
        Atom::Executed(cmd) => {
            if cmd.has_failed {
                return None;
            }
            match cmd.result.embedding.as_deref() {
                Some([piece]) => Some(piece.clone()),
                Some([]) => Some(Piece::text("")),
                _ => None,
            }
        }
        Atom::Command(_) => None,
    }
}

fn sole_text(atom: &Atom) -> Option<String> {
    match sole_of(atom)? {
        Piece::Text(text) => Some(text),
        _ => None,
    }
}

fn split_option(text: &str, rest: Vec<Atom>) -> Option<ArgOption> {
    let (key, value) = match text.split_once('=') {
        Some((key, value)) => {
            let mut atoms = vec![Atom::text(value)];
            atoms.extend(rest);
            let value = glue(atoms).unwrap_or_else(|| Atom::text(""));
            (key, Some(ArgumentView::new(value)))
        }
        None if rest.is_empty() => (text, None),
        None => return None,
    };
    let key = unescape(key);
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return None;
    }
    Some(ArgOption { key, value })
}
