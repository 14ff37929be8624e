//! Message tree shared by the tokenizer and the evaluator
//!
//! The same [`Atom`] type carries both the unexecuted form produced by the
//! tokenizer and the executed form produced by the evaluator. Every node can
//! reconstruct the exact source it was parsed from via `as_raw`.

use std::sync::Arc;

use crate::context::SlotId;
use crate::types::{push_piece, CommandDescriptor, CommandResult, CommandStyle, Note, Piece};

/// One node of the message tree
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// A text run or an opaque rich piece
    Plain(Piece),

    /// Content enclosed in a bracket pair that did not form a command
    Group(Group),

    /// Two or more atoms glued with no whitespace between them
    Compact(CompactComplex),

    /// A recognized but not yet resolved command
    Command(UnexecutedCommand),

    /// A resolved command
    Executed(Arc<ExecutedCommand>),
}

/// An atom plus the literal whitespace that followed it
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub atom: Atom,
    pub gap: String,
}

impl Part {
    pub fn new(atom: Atom, gap: impl Into<String>) -> Self {
        Self {
            atom,
            gap: gap.into(),
        }
    }
}

/// `{ parts }`; `parts` is never empty
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub left_pad: String,
    pub parts: Vec<Part>,
}

/// Heterogeneous atoms glued together, e.g. `key=@user`; always 2+ parts
#[derive(Debug, Clone, PartialEq)]
pub struct CompactComplex {
    pub parts: Vec<Atom>,
}

/// A command site found by the tokenizer
#[derive(Debug, Clone, PartialEq)]
pub struct UnexecutedCommand {
    /// Matching commands, shortest keyword first
    pub candidates: Vec<Arc<CommandDescriptor>>,
    pub style: CommandStyle,
    pub prefix: String,
    pub await_marker: Option<String>,
    /// Keyword of the longest candidate, as typed
    pub matched_keyword: String,
    /// Whitespace after `{` (embedded only)
    pub left_pad: String,
    /// Whitespace between the keyword and the first argument
    pub head_gap: String,
    pub arguments: Vec<Part>,
}

impl UnexecutedCommand {
    pub fn is_await(&self) -> bool {
        self.await_marker.is_some()
    }

    /// The pieces of the invocation itself, without the surrounding braces
    pub fn invocation_raw(&self) -> Vec<Piece> {
        let mut out = Vec::new();
        write_invocation(
            &mut out,
            &self.prefix,
            self.await_marker.as_deref(),
            &self.matched_keyword,
            &self.head_gap,
            &self.arguments,
        );
        out
    }

    /// Turn this site back into literal content, keeping already-resolved arguments
    pub fn into_literal(self, arguments: Vec<Part>) -> Vec<Atom> {
        let parts = literal_parts(
            &self.prefix,
            self.await_marker.as_deref(),
            &self.matched_keyword,
            self.head_gap,
            arguments,
        );
        match self.style {
            CommandStyle::Embedded => vec![Atom::Group(Group {
                left_pad: self.left_pad,
                parts,
            })],
            CommandStyle::Line => flatten_parts(&self.left_pad, parts),
        }
    }
}

/// A command site after its slot was resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCommand {
    pub slot_id: SlotId,
    pub descriptor: Arc<CommandDescriptor>,
    pub style: CommandStyle,
    pub prefix: String,
    pub await_marker: Option<String>,
    pub left_pad: String,
    pub head_gap: String,
    /// Resolved arguments as handed to the handler
    pub arguments: Vec<Part>,
    pub result: CommandResult,
    pub has_failed: bool,
    pub notes: Vec<Note>,
}

impl ExecutedCommand {
    pub fn is_await(&self) -> bool {
        self.await_marker.is_some()
    }

    pub fn keyword(&self) -> &str {
        &self.descriptor.keyword
    }

    /// The first error note, if any
    pub fn error(&self) -> Option<&Note> {
        self.notes.iter().find(|note| note.is_error())
    }

    /// The pieces of the invocation itself, without the surrounding braces
    pub fn invocation_raw(&self) -> Vec<Piece> {
        let mut out = Vec::new();
        write_invocation(
            &mut out,
            &self.prefix,
            self.await_marker.as_deref(),
            &self.descriptor.keyword,
            &self.head_gap,
            &self.arguments,
        );
        out
    }
}

/// An ordered sequence of atoms between top-level linefeeds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    pub atoms: Vec<Atom>,
}

impl Line {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }

    /// The line's only atom when it is a line-style command
    pub fn as_owner(&self) -> Option<&UnexecutedCommand> {
        match self.atoms.as_slice() {
            [Atom::Command(cmd)] if cmd.style == CommandStyle::Line => Some(cmd),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Vec<Piece> {
        let mut out = Vec::new();
        for atom in &self.atoms {
            atom.write_raw(&mut out);
        }
        out
    }
}

/// Reconstruct a whole message, joining lines with linefeeds
pub fn message_as_raw(lines: &[Line]) -> Vec<Piece> {
    let mut out = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            push_piece(&mut out, Piece::text("\n"));
        }
        for atom in &line.atoms {
            atom.write_raw(&mut out);
        }
    }
    out
}

impl Atom {
    pub fn text(text: impl Into<String>) -> Self {
        Atom::Plain(Piece::Text(text.into()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Atom::Plain(piece) => piece.as_text(),
            _ => None,
        }
    }

    /// Lossless reconstruction of the source pieces
    pub fn as_raw(&self) -> Vec<Piece> {
        let mut out = Vec::new();
        self.write_raw(&mut out);
        out
    }

    pub(crate) fn write_raw(&self, out: &mut Vec<Piece>) {
        match self {
            Atom::Plain(piece) => push_piece(out, piece.clone()),
            Atom::Group(group) => {
                push_piece(out, Piece::text("{"));
                push_piece(out, Piece::text(group.left_pad.as_str()));
                write_parts(out, &group.parts);
                push_piece(out, Piece::text("}"));
            }
            Atom::Compact(compact) => {
                for atom in &compact.parts {
                    atom.write_raw(out);
                }
            }
            Atom::Command(cmd) => write_command(
                out,
                cmd.style,
                &cmd.left_pad,
                &cmd.prefix,
                cmd.await_marker.as_deref(),
                &cmd.matched_keyword,
                &cmd.head_gap,
                &cmd.arguments,
            ),
            Atom::Executed(cmd) => write_command(
                out,
                cmd.style,
                &cmd.left_pad,
                &cmd.prefix,
                cmd.await_marker.as_deref(),
                &cmd.descriptor.keyword,
                &cmd.head_gap,
                &cmd.arguments,
            ),
        }
    }

    /// Whether an unresolved command remains anywhere in this subtree
    pub fn contains_command(&self) -> bool {
        match self {
            Atom::Plain(_) => false,
            Atom::Group(group) => group.parts.iter().any(|p| p.atom.contains_command()),
            Atom::Compact(compact) => compact.parts.iter().any(Atom::contains_command),
            Atom::Command(_) => true,
            Atom::Executed(cmd) => cmd.arguments.iter().any(|p| p.atom.contains_command()),
        }
    }
}

fn write_parts(out: &mut Vec<Piece>, parts: &[Part]) {
    for part in parts {
        part.atom.write_raw(out);
        push_piece(out, Piece::text(part.gap.as_str()));
    }
}

fn write_invocation(
    out: &mut Vec<Piece>,
    prefix: &str,
    await_marker: Option<&str>,
    keyword: &str,
    head_gap: &str,
    arguments: &[Part],
) {
    push_piece(out, Piece::text(prefix));
    if let Some(marker) = await_marker {
        push_piece(out, Piece::text(marker));
    }
    push_piece(out, Piece::text(keyword));
    push_piece(out, Piece::text(head_gap));
    write_parts(out, arguments);
}

#[allow(clippy::too_many_arguments)]
fn write_command(
    out: &mut Vec<Piece>,
    style: CommandStyle,
    left_pad: &str,
    prefix: &str,
    await_marker: Option<&str>,
    keyword: &str,
    head_gap: &str,
    arguments: &[Part],
) {
    if style == CommandStyle::Embedded {
        push_piece(out, Piece::text("{"));
        push_piece(out, Piece::text(left_pad));
    }
    write_invocation(out, prefix, await_marker, keyword, head_gap, arguments);
    if style == CommandStyle::Embedded {
        push_piece(out, Piece::text("}"));
    }
}

/// Append an atom, merging adjacent text atoms
pub(crate) fn push_atom(atoms: &mut Vec<Atom>, atom: Atom) {
    if let Atom::Plain(Piece::Text(text)) = &atom {
        if text.is_empty() {
            return;
        }
        if let Some(Atom::Plain(Piece::Text(last))) = atoms.last_mut() {
            last.push_str(text);
            return;
        }
    }
    atoms.push(atom);
}

/// Collapse glued atoms into one: a lone atom stays as is, more become a compact
pub(crate) fn glue(atoms: Vec<Atom>) -> Option<Atom> {
    let mut merged = Vec::with_capacity(atoms.len());
    for atom in atoms {
        match atom {
            Atom::Compact(compact) => {
                for inner in compact.parts {
                    push_atom(&mut merged, inner);
                }
            }
            other => push_atom(&mut merged, other),
        }
    }
    match merged.len() {
        0 => None,
        1 => merged.pop(),
        _ => Some(Atom::Compact(CompactComplex { parts: merged })),
    }
}

/// Parts of a command turned back into literal content
fn literal_parts(
    prefix: &str,
    await_marker: Option<&str>,
    keyword: &str,
    head_gap: String,
    arguments: Vec<Part>,
) -> Vec<Part> {
    let head = format!("{}{}{}", prefix, await_marker.unwrap_or(""), keyword);
    let mut arguments = arguments.into_iter();
    let mut parts = Vec::new();

    if head_gap.is_empty() {
        match arguments.next() {
            Some(first) => {
                let atom = glue(vec![Atom::text(head), first.atom]).unwrap_or_else(|| Atom::text(""));
                parts.push(Part::new(atom, first.gap));
            }
            None => parts.push(Part::new(Atom::text(head), head_gap)),
        }
    } else {
        parts.push(Part::new(Atom::text(head), head_gap));
    }
    parts.extend(arguments);
    parts
}

/// Flatten reduced parts back into a run of atoms
pub(crate) fn flatten_parts(left_pad: &str, parts: Vec<Part>) -> Vec<Atom> {
    let mut atoms = Vec::new();
    push_atom(&mut atoms, Atom::text(left_pad));
    for part in parts {
        match part.atom {
            Atom::Compact(compact) => {
                for atom in compact.parts {
                    push_atom(&mut atoms, atom);
                }
            }
            atom => push_atom(&mut atoms, atom),
        }
        push_atom(&mut atoms, Atom::text(part.gap));
    }
    atoms
}
