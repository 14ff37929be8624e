//! Tokenizer turning a flat piece sequence into lines of unexecuted atoms
//!
//! The tokenizer is a stack-of-scopes state machine. A line whose leading
//! text starts with the prefix opens a line scope that lasts until the next
//! top-level linefeed; an unescaped `{` opens a group scope anywhere and the
//! matching `}` closes it. Closing a scope reduces its buffer to parts and
//! checks the first part for `prefix [await-marker] keyword`.
//!
//! Nothing is ever dropped: unclosed groups and scopes without a matching
//! command fall back to literal content, so `message_as_raw(tokenize(x))`
//! reproduces `x`. A `{` that is never closed is literal from the start, so
//! linefeeds after it still end lines.

use std::mem;
use std::sync::Arc;

use tracing::debug;

use crate::atom::{flatten_parts, glue, push_atom, Atom, Group, Line, Part, UnexecutedCommand};
use crate::registry::CommandRegistry;
use crate::types::{normalize_pieces, CommandDescriptor, CommandStyle, Piece};

/// Tokenizer bound to a registry and a prefix
pub struct Tokenizer<'a> {
    registry: &'a CommandRegistry,
    prefix: &'a str,
    await_marker: Option<&'a str>,
}

impl<'a> Tokenizer<'a> {
    /// Create a tokenizer; an empty await marker disables await detection
    pub fn new(registry: &'a CommandRegistry, prefix: &'a str, await_marker: Option<&'a str>) -> Self {
        Self {
            registry,
            prefix,
            await_marker: await_marker.filter(|marker| !marker.is_empty()),
        }
    }

    /// Tokenize one message
    pub fn tokenize(&self, pieces: &[Piece]) -> Vec<Line> {
        let pieces = normalize_pieces(pieces.iter().cloned());
        let mut state = State::new(self, closed_braces(&pieces));
        for piece in pieces {
            match piece {
                Piece::Text(text) => state.feed_text(&text),
                other => {
                    state.at_line_start = false;
                    push_atom(state.buffer(), Atom::Plain(other));
                }
            }
        }
        let lines = state.finish();
        debug!(
            lines = lines.len(),
            owners = lines.iter().filter(|l| l.as_owner().is_some()).count(),
            "Tokenized message"
        );
        lines
    }

    fn close_line_scope(&self, buffer: Vec<Atom>) -> Vec<Atom> {
        let reduced = reduce(buffer);
        if reduced.parts.is_empty() || !reduced.left_pad.is_empty() {
            return flatten_parts(&reduced.left_pad, reduced.parts);
        }
        match self.build_command(reduced, CommandStyle::Line) {
            Ok(cmd) => vec![Atom::Command(cmd)],
            Err(reduced) => flatten_parts(&reduced.left_pad, reduced.parts),
        }
    }

    fn close_group_scope(&self, buffer: Vec<Atom>) -> Vec<Atom> {
        let reduced = reduce(buffer);
        if reduced.parts.is_empty() {
            return vec![Atom::text(format!("{{{}}}", reduced.left_pad))];
        }
        match self.build_command(reduced, CommandStyle::Embedded) {
            Ok(cmd) => vec![Atom::Command(cmd)],
            Err(reduced) => vec![Atom::Group(Group {
                left_pad: reduced.left_pad,
                parts: reduced.parts,
            })],
        }
    }

    fn build_command(&self, reduced: Reduced, style: CommandStyle) -> Result<UnexecutedCommand, Reduced> {
        let (head_glued, lead_text) = match reduced.parts.first().map(|p| &p.atom) {
            Some(Atom::Plain(Piece::Text(text))) => (false, text),
            Some(Atom::Compact(compact)) => match compact.parts.first() {
                Some(Atom::Plain(Piece::Text(text))) => (true, text),
                _ => return Err(reduced),
            },
            _ => return Err(reduced),
        };
        let Some(after_prefix) = lead_text.strip_prefix(self.prefix) else {
            return Err(reduced);
        };
        let (await_marker, rest) = match self.await_marker {
            Some(marker) if after_prefix.starts_with(marker) => {
                (Some(marker.to_string()), &after_prefix[marker.len()..])
            }
            _ => (None, after_prefix),
        };

        let rest = rest.to_string();

        let candidates = select_candidates(self.registry.match_prefix(&rest), &rest, head_glued, style);
        let Some(longest) = candidates.last() else {
            return Err(reduced);
        };
        let matched_keyword = longest.keyword.clone();
        let leftover = rest[matched_keyword.len()..].to_string();

        let mut parts = reduced.parts.into_iter();
        let Some(head) = parts.next() else {
            unreachable!("reduced scope checked non-empty above");
        };
        let mut glued = Vec::new();
        if !leftover.is_empty() {
            glued.push(Atom::text(leftover));
        }
        if let Atom::Compact(compact) = head.atom {
            glued.extend(compact.parts.into_iter().skip(1));
        }
        let (head_gap, mut arguments) = match glue(glued) {
            Some(first) => (String::new(), vec![Part::new(first, head.gap)]),
            None => (head.gap, Vec::new()),
        };
        arguments.extend(parts);

        Ok(UnexecutedCommand {
            candidates,
            style,
            prefix: self.prefix.to_string(),
            await_marker,
            matched_keyword,
            left_pad: reduced.left_pad,
            head_gap,
            arguments,
        })
    }
}

/// Drop candidates that could never be selected at this site.
///
/// Only the longest remaining candidate sees the real spacing after its
/// keyword; every shorter one has the leftover keyword characters glued to
/// its first argument and therefore always counts as squeezed.
fn select_candidates(
    matched: Vec<Arc<CommandDescriptor>>,
    rest: &str,
    head_glued: bool,
    style: CommandStyle,
) -> Vec<Arc<CommandDescriptor>> {
    let mut kept = Vec::with_capacity(matched.len());
    for candidate in matched.into_iter().rev() {
        let squeezed = if kept.is_empty() {
            rest.len() > candidate.keyword.len() || head_glued
        } else {
            true
        };
        if candidate.accepts(style, squeezed) {
            kept.push(candidate);
        }
    }
    kept.reverse();
    kept
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    LineArgs,
    Group,
}

struct Scope {
    kind: ScopeKind,
    buffer: Vec<Atom>,
}

struct State<'t, 'a> {
    tokenizer: &'t Tokenizer<'a>,
    lines: Vec<Line>,
    line: Vec<Atom>,
    stack: Vec<Scope>,
    at_line_start: bool,
    /// Per unescaped `{` in input order, whether a `}` closes it
    closed_braces: Vec<bool>,
    next_brace: usize,
}

impl<'t, 'a> State<'t, 'a> {
    fn new(tokenizer: &'t Tokenizer<'a>, closed_braces: Vec<bool>) -> Self {
        Self {
            tokenizer,
            lines: Vec::new(),
            line: Vec::new(),
            stack: Vec::new(),
            at_line_start: true,
            closed_braces,
            next_brace: 0,
        }
    }

    fn buffer(&mut self) -> &mut Vec<Atom> {
        match self.stack.last_mut() {
            Some(scope) => &mut scope.buffer,
            None => &mut self.line,
        }
    }

    fn push_str(&mut self, text: &str) {
        push_atom(self.buffer(), Atom::text(text));
    }

    fn group_open(&self) -> bool {
        matches!(self.stack.last(), Some(scope) if scope.kind == ScopeKind::Group)
    }

    fn feed_text(&mut self, text: &str) {
        let mut chars = text.char_indices().peekable();
        while let Some((idx, ch)) = chars.next() {
            if self.at_line_start {
                self.at_line_start = false;
                if self.stack.is_empty() && text[idx..].starts_with(self.tokenizer.prefix) {
                    self.stack.push(Scope {
                        kind: ScopeKind::LineArgs,
                        buffer: Vec::new(),
                    });
                }
            }

            match ch {
                '\\' => match chars.peek() {
                    Some(&(_, next)) if matches!(next, '{' | '}' | '\\') => {
                        chars.next();
                        let mut escaped = String::from('\\');
                        escaped.push(next);
                        self.push_str(&escaped);
                    }
                    _ => self.push_str("\\"),
                },
                '{' => {
                    let closed = self.closed_braces.get(self.next_brace).copied().unwrap_or(false);
                    self.next_brace += 1;
                    if closed {
                        self.stack.push(Scope {
                            kind: ScopeKind::Group,
                            buffer: Vec::new(),
                        });
                    } else {
                        self.push_str("{");
                    }
                }
                '}' if self.group_open() => self.close_group(),
                '\n' if !self.group_open() => self.end_line(),
                _ => {
                    let mut buf = [0u8; 4];
                    self.push_str(ch.encode_utf8(&mut buf));
                }
            }
        }
    }

    fn close_group(&mut self) {
        let Some(scope) = self.stack.pop() else {
            return;
        };
        for atom in self.tokenizer.close_group_scope(scope.buffer) {
            push_atom(self.buffer(), atom);
        }
    }

    fn end_line(&mut self) {
        if let Some(scope) = self.stack.pop() {
            debug_assert_eq!(scope.kind, ScopeKind::LineArgs);
            for atom in self.tokenizer.close_line_scope(scope.buffer) {
                push_atom(&mut self.line, atom);
            }
        }
        let atoms = mem::take(&mut self.line);
        self.lines.push(Line::new(atoms));
        self.at_line_start = true;
    }

    fn finish(mut self) -> Vec<Line> {
        while let Some(scope) = self.stack.pop() {
            match scope.kind {
                ScopeKind::Group => {
                    // Unclosed group: reinsert the brace and keep its content literally.
                    self.push_str("{");
                    for atom in scope.buffer {
                        push_atom(self.buffer(), atom);
                    }
                }
                ScopeKind::LineArgs => {
                    for atom in self.tokenizer.close_line_scope(scope.buffer) {
                        push_atom(&mut self.line, atom);
                    }
                }
            }
        }
        let atoms = mem::take(&mut self.line);
        self.lines.push(Line::new(atoms));
        self.lines
    }
}

/// Match braces ahead of the scan, honouring escapes
///
/// A `}` closes the innermost open `{`; braces left open at the end are
/// reported as unclosed.
fn closed_braces(pieces: &[Piece]) -> Vec<bool> {
    let mut closed = Vec::new();
    let mut open = Vec::new();
    for text in pieces.iter().filter_map(Piece::as_text) {
        let mut chars = text.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => {
                    chars.next();
                }
                '{' => {
                    open.push(closed.len());
                    closed.push(false);
                }
                '}' => {
                    if let Some(idx) = open.pop() {
                        closed[idx] = true;
                    }
                }
                _ => {}
            }
        }
    }
    closed
}

/// A closed scope split into whitespace-separated parts
struct Reduced {
    left_pad: String,
    parts: Vec<Part>,
}

fn reduce(buffer: Vec<Atom>) -> Reduced {
    let mut left_pad = String::new();
    let mut parts = Vec::new();
    let mut glued: Vec<Atom> = Vec::new();
    let mut gap = String::new();

    for atom in buffer {
        match atom {
            Atom::Plain(Piece::Text(text)) => {
                for (is_ws, segment) in split_whitespace_runs(&text) {
                    if is_ws {
                        if glued.is_empty() && parts.is_empty() {
                            left_pad.push_str(segment);
                        } else {
                            gap.push_str(segment);
                        }
                    } else {
                        push_item(Atom::text(segment), &mut glued, &mut gap, &mut parts);
                    }
                }
            }
            other => push_item(other, &mut glued, &mut gap, &mut parts),
        }
    }
    if let Some(done) = glue(glued) {
        parts.push(Part::new(done, gap));
    }

    Reduced { left_pad, parts }
}

/// Start a new glued run if whitespace separated this atom from the previous one
fn push_item(atom: Atom, glued: &mut Vec<Atom>, gap: &mut String, parts: &mut Vec<Part>) {
    if !gap.is_empty() {
        if let Some(done) = glue(mem::take(glued)) {
            parts.push(Part::new(done, mem::take(gap)));
        }
    }
    glued.push(atom);
}

/// Split text into alternating whitespace and non-whitespace runs
fn split_whitespace_runs(text: &str) -> Vec<(bool, &str)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (idx, ch) in text.char_indices() {
        let is_ws = ch.is_whitespace();
        match current {
            Some(kind) if kind == is_ws => {}
            Some(kind) => {
                runs.push((kind, &text[start..idx]));
                start = idx;
                current = Some(is_ws);
            }
            None => current = Some(is_ws),
        }
    }
    if let Some(kind) = current {
        runs.push((kind, &text[start..]));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{message_as_raw, CompactComplex};
    use crate::executor::handler_fn;
    use crate::types::{ArgumentStartPolicy, Outcome};

    fn registry(keywords: &[&str]) -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        for keyword in keywords {
            registry
                .register(CommandDescriptor::new(
                    *keyword,
                    *keyword,
                    handler_fn(|_, _| Ok(Outcome::Empty)),
                ))
                .unwrap();
        }
        registry
    }

    fn tokenize(registry: &CommandRegistry, text: &str) -> Vec<Line> {
        Tokenizer::new(registry, "/", Some("~")).tokenize(&[Piece::text(text)])
    }

    fn owner(lines: &[Line], idx: usize) -> &UnexecutedCommand {
        lines[idx].as_owner().expect("owner line")
    }

    #[test]
    fn test_split_whitespace_runs() {
        assert_eq!(
            split_whitespace_runs(" ab  c\n"),
            vec![(true, " "), (false, "ab"), (true, "  "), (false, "c"), (true, "\n")]
        );
        assert!(split_whitespace_runs("").is_empty());
    }

    #[test]
    fn test_plain_text_is_one_line_of_text() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "hello world");
        assert_eq!(lines, vec![Line::new(vec![Atom::text("hello world")])]);
    }

    #[test]
    fn test_line_command_with_arguments() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "/foo a  b ");
        let cmd = owner(&lines, 0);
        assert_eq!(cmd.matched_keyword, "foo");
        assert_eq!(cmd.head_gap, " ");
        assert_eq!(
            cmd.arguments,
            vec![Part::new(Atom::text("a"), "  "), Part::new(Atom::text("b"), " ")]
        );
        assert!(!cmd.is_await());
    }

    #[test]
    fn test_candidates_shortest_to_longest() {
        let registry = registry(&["fo", "foo", "fooo"]);
        let lines = tokenize(&registry, "/foo");
        let keywords: Vec<_> = owner(&lines, 0)
            .candidates
            .iter()
            .map(|c| c.keyword.as_str())
            .collect();
        assert_eq!(keywords, vec!["fo", "foo"]);
    }

    #[test]
    fn test_leftover_becomes_first_argument() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "/foobar baz");
        let cmd = owner(&lines, 0);
        assert_eq!(cmd.head_gap, "");
        assert_eq!(
            cmd.arguments,
            vec![Part::new(Atom::text("bar"), " "), Part::new(Atom::text("baz"), "")]
        );
    }

    #[test]
    fn test_requires_gap_squeezed_is_literal() {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                CommandDescriptor::new("foo", "foo", handler_fn(|_, _| Ok(Outcome::Empty)))
                    .with_argument_start(ArgumentStartPolicy::RequiresGap),
            )
            .unwrap();
        let lines = tokenize(&registry, "/foobar");
        assert_eq!(lines, vec![Line::new(vec![Atom::text("/foobar")])]);

        let lines = tokenize(&registry, "/foo bar");
        assert!(lines[0].as_owner().is_some());
    }

    #[test]
    fn test_await_marker() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "/~foo x");
        let cmd = owner(&lines, 0);
        assert!(cmd.is_await());
        assert_eq!(message_as_raw(&lines), vec![Piece::text("/~foo x")]);
    }

    #[test]
    fn test_embedded_command_inside_text() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "a { /foo 1 } b");
        assert_eq!(lines.len(), 1);
        let atoms = &lines[0].atoms;
        assert_eq!(atoms[0], Atom::text("a "));
        match &atoms[1] {
            Atom::Command(cmd) => {
                assert_eq!(cmd.style, CommandStyle::Embedded);
                assert_eq!(cmd.left_pad, " ");
                assert_eq!(cmd.head_gap, " ");
                assert_eq!(cmd.arguments, vec![Part::new(Atom::text("1"), " ")]);
            }
            other => panic!("expected embedded command, got {:?}", other),
        }
        assert_eq!(atoms[2], Atom::text(" b"));
    }

    #[test]
    fn test_group_without_command() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "{a b}");
        assert_eq!(
            lines[0].atoms,
            vec![Atom::Group(Group {
                left_pad: String::new(),
                parts: vec![Part::new(Atom::text("a"), " "), Part::new(Atom::text("b"), "")],
            })]
        );
    }

    #[test]
    fn test_empty_group_and_stray_brace_are_text() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "x{ }y}");
        assert_eq!(lines[0].atoms, vec![Atom::text("x{ }y}")]);
    }

    #[test]
    fn test_unclosed_group_is_literal() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "a {/foo b");
        assert_eq!(lines[0].atoms, vec![Atom::text("a {/foo b")]);
    }

    #[test]
    fn test_unclosed_brace_keeps_following_lines() {
        let registry = registry(&["roll"]);
        let lines = tokenize(&registry, "so sad :{\n/roll 1d6");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].atoms, vec![Atom::text("so sad :{")]);
        let cmd = owner(&lines, 1);
        assert_eq!(cmd.matched_keyword, "roll");
        assert_eq!(cmd.arguments, vec![Part::new(Atom::text("1d6"), "")]);
    }

    #[test]
    fn test_unclosed_brace_inside_line_command() {
        let registry = registry(&["echo", "roll"]);
        let lines = tokenize(&registry, "/echo :{\n/roll 1d6");
        assert_eq!(lines.len(), 2);
        let echo = owner(&lines, 0);
        assert_eq!(echo.matched_keyword, "echo");
        assert_eq!(echo.arguments, vec![Part::new(Atom::text(":{"), "")]);
        assert_eq!(owner(&lines, 1).matched_keyword, "roll");
        assert_eq!(
            message_as_raw(&lines),
            vec![Piece::text("/echo :{\n/roll 1d6")]
        );
    }

    #[test]
    fn test_outer_unclosed_brace_keeps_inner_group() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "{ a {/foo}\nb");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].atoms[0], Atom::text("{ a "));
        assert!(matches!(lines[0].atoms[1], Atom::Command(_)));
        assert_eq!(lines[1].atoms, vec![Atom::text("b")]);
    }

    #[test]
    fn test_closed_braces() {
        let pieces = [Piece::text(r"{a {b} \{ } {")];
        assert_eq!(closed_braces(&pieces), vec![true, true, false]);
    }

    #[test]
    fn test_escaped_braces_do_not_open_groups() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, r"\{/foo\}");
        assert_eq!(lines[0].atoms, vec![Atom::text(r"\{/foo\}")]);
    }

    #[test]
    fn test_group_spans_linefeeds_inside_line_command() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "/foo {a\nb}\nnext");
        assert_eq!(lines.len(), 2);
        let cmd = owner(&lines, 0);
        match &cmd.arguments[0].atom {
            Atom::Group(group) => assert_eq!(group.parts[0].gap, "\n"),
            other => panic!("expected group, got {:?}", other),
        }
        assert_eq!(lines[1].atoms, vec![Atom::text("next")]);
    }

    #[test]
    fn test_compact_argument() {
        let registry = registry(&["give"]);
        let pieces = vec![
            Piece::text("/give to="),
            Piece::Mention { target: 9 },
            Piece::text(" 3"),
        ];
        let lines = Tokenizer::new(&registry, "/", None).tokenize(&pieces);
        let cmd = owner(&lines, 0);
        assert_eq!(
            cmd.arguments[0].atom,
            Atom::Compact(CompactComplex {
                parts: vec![Atom::text("to="), Atom::Plain(Piece::Mention { target: 9 })],
            })
        );
        assert_eq!(message_as_raw(&lines), normalize_pieces(pieces));
    }

    #[test]
    fn test_unknown_command_line_is_literal() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "/bar {/foo}");
        assert_eq!(lines[0].atoms.len(), 2);
        assert_eq!(lines[0].atoms[0], Atom::text("/bar "));
        assert!(matches!(lines[0].atoms[1], Atom::Command(_)));
    }

    #[test]
    fn test_prefix_only_at_line_start() {
        let registry = registry(&["foo"]);
        let lines = tokenize(&registry, "x /foo\n/foo");
        assert!(lines[0].as_owner().is_none());
        assert!(lines[1].as_owner().is_some());
    }

    #[test]
    fn test_embedded_only_command_not_matched_as_line() {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                CommandDescriptor::new("e", "e", handler_fn(|_, _| Ok(Outcome::Empty)))
                    .with_styles(crate::types::CommandStyles::EMBEDDED),
            )
            .unwrap();
        let lines = tokenize(&registry, "/e\n{/e}");
        assert_eq!(lines[0].atoms, vec![Atom::text("/e")]);
        assert!(matches!(lines[1].atoms[0], Atom::Command(_)));
    }
}
