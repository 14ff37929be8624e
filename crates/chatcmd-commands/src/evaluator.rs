//! Two-phase resolution of a tokenized message
//!
//! Phase one walks every line depth-first and resolves embedded commands,
//! groups and compacts. A line that is exactly one line command becomes an
//! owner: only its arguments are resolved in phase one. Phase two runs the
//! owners in source order, each seeing the resolved lines that follow it.
//!
//! Handlers are awaited one at a time. Slot numbering and error fallback
//! depend on that order.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error};

use crate::atom::{glue, Atom, ExecutedCommand, Line, Part, UnexecutedCommand};
use crate::context::{ExecuteContext, LineInfo, SlotId};
use crate::executor::{resolve_command, Eligibility};
use crate::types::{CommandStyle, Piece};

/// Resolves tokenized lines against their handlers
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    disabled: bool,
}

enum Entry {
    Content(Line),
    Owner {
        slot_id: SlotId,
        cmd: UnexecutedCommand,
        arguments: Vec<Part>,
        has_nested: bool,
    },
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Degraded mode: only owners flagged to run while disabled, and without
    /// nested commands in their arguments, are eligible
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Resolve every line of a message
    pub async fn evaluate(&self, ctx: &mut ExecuteContext, lines: Vec<Line>) -> Vec<Line> {
        let line_numbers = source_line_numbers(&lines);
        let mut entries = Vec::with_capacity(lines.len());
        for mut line in lines {
            if line.as_owner().is_some() {
                if let Some(Atom::Command(mut cmd)) = line.atoms.pop() {
                    let slot_id = ctx.allocate_slot();
                    let has_nested = cmd.arguments.iter().any(|p| p.atom.contains_command());
                    let raw_arguments = std::mem::take(&mut cmd.arguments);
                    let arguments = self.resolve_parts(ctx, raw_arguments).await;
                    entries.push(Entry::Owner {
                        slot_id,
                        cmd,
                        arguments,
                        has_nested,
                    });
                    continue;
                }
            }
            let mut atoms = Vec::with_capacity(line.atoms.len());
            for atom in line.atoms {
                atoms.extend(self.resolve_atom(ctx, atom).await);
            }
            entries.push(Entry::Content(Line::new(atoms)));
        }

        let owner_count = entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Owner { .. }))
            .count();
        let following: Vec<Vec<Line>> = (0..entries.len())
            .map(|idx| {
                entries[idx + 1..]
                    .iter()
                    .map_while(|entry| match entry {
                        Entry::Content(line) => Some(line.clone()),
                        Entry::Owner { .. } => None,
                    })
                    .collect()
            })
            .collect();

        let mut out = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.into_iter().enumerate() {
            match entry {
                Entry::Content(line) => out.push(line),
                Entry::Owner {
                    slot_id,
                    cmd,
                    arguments,
                    has_nested,
                } => {
                    let info = LineInfo {
                        following_lines: &following[idx],
                        owner_count,
                        line_number: line_numbers[idx],
                    };
                    out.push(
                        self.resolve_owner(ctx, slot_id, cmd, arguments, has_nested, info)
                            .await,
                    );
                }
            }
        }
        out
    }

    async fn resolve_owner(
        &self,
        ctx: &mut ExecuteContext,
        slot_id: SlotId,
        cmd: UnexecutedCommand,
        arguments: Vec<Part>,
        has_nested: bool,
        info: LineInfo<'_>,
    ) -> Line {
        if self.disabled && has_nested {
            debug!(slot = %slot_id, keyword = %cmd.matched_keyword, "Skipped owner with nested commands while disabled");
            fill(ctx, slot_id, None);
            return Line::new(cmd.into_literal(arguments));
        }
        let eligibility = Eligibility {
            disabled: self.disabled,
            line: Some(info),
        };
        match resolve_command(ctx, slot_id, &cmd, &arguments, eligibility).await {
            Some(executed) => {
                let executed = Arc::new(executed);
                fill(ctx, slot_id, Some(Arc::clone(&executed)));
                Line::new(vec![Atom::Executed(executed)])
            }
            None => {
                fill(ctx, slot_id, None);
                Line::new(cmd.into_literal(arguments))
            }
        }
    }

    fn resolve_parts<'a>(
        &'a self,
        ctx: &'a mut ExecuteContext,
        parts: Vec<Part>,
    ) -> BoxFuture<'a, Vec<Part>> {
        async move {
            let mut out = Vec::with_capacity(parts.len());
            for part in parts {
                let atoms = self.resolve_atom(ctx, part.atom).await;
                let atom = glue(atoms).unwrap_or_else(|| Atom::text(""));
                out.push(Part::new(atom, part.gap));
            }
            out
        }
        .boxed()
    }

    /// Resolve one atom depth-first; a declined command expands to literal atoms
    fn resolve_atom<'a>(&'a self, ctx: &'a mut ExecuteContext, atom: Atom) -> BoxFuture<'a, Vec<Atom>> {
        async move {
            match atom {
                Atom::Plain(_) | Atom::Executed(_) => vec![atom],
                Atom::Group(mut group) => {
                    let parts = std::mem::take(&mut group.parts);
                    group.parts = self.resolve_parts(ctx, parts).await;
                    vec![Atom::Group(group)]
                }
                Atom::Compact(compact) => {
                    let mut atoms = Vec::with_capacity(compact.parts.len());
                    for inner in compact.parts {
                        atoms.extend(self.resolve_atom(ctx, inner).await);
                    }
                    glue(atoms).into_iter().collect()
                }
                Atom::Command(mut cmd) => {
                    let slot_id = ctx.allocate_slot();
                    let raw_arguments = std::mem::take(&mut cmd.arguments);
                    let arguments = self.resolve_parts(ctx, raw_arguments).await;

                    if self.disabled {
                        debug!(slot = %slot_id, keyword = %cmd.matched_keyword, "Skipped embedded command while disabled");
                        fill(ctx, slot_id, None);
                        return cmd.into_literal(arguments);
                    }

                    let eligibility = Eligibility {
                        disabled: false,
                        line: None,
                    };
                    match resolve_command(ctx, slot_id, &cmd, &arguments, eligibility).await {
                        Some(executed) => {
                            let executed: Arc<ExecutedCommand> = Arc::new(executed);
                            fill(ctx, slot_id, Some(Arc::clone(&executed)));
                            vec![Atom::Executed(executed)]
                        }
                        None => {
                            fill(ctx, slot_id, None);
                            cmd.into_literal(arguments)
                        }
                    }
                }
            }
        }
        .boxed()
    }
}

fn fill(ctx: &mut ExecuteContext, slot_id: SlotId, value: Option<Arc<ExecutedCommand>>) {
    if let Err(err) = ctx.fill_slot(slot_id, value) {
        debug_assert!(false, "slot bookkeeping broken: {}", err);
        error!(slot = %slot_id, error = %err, "Failed to record slot");
    }
}

/// 1-based source line of each line; linefeeds inside groups count
fn source_line_numbers(lines: &[Line]) -> Vec<usize> {
    let mut next = 1;
    lines
        .iter()
        .map(|line| {
            let current = next;
            let linefeeds: usize = line
                .as_raw()
                .iter()
                .filter_map(Piece::as_text)
                .map(|text| text.matches('\n').count())
                .sum();
            next += linefeeds + 1;
            current
        })
        .collect()
}

/// Executed commands of a resolved tree, depth-first in source order,
/// each with its source line number
pub fn executed_commands(lines: &[Line]) -> Vec<(usize, Arc<ExecutedCommand>)> {
    let mut out = Vec::new();
    for (line, line_number) in lines.iter().zip(source_line_numbers(lines)) {
        for atom in &line.atoms {
            collect_executed(atom, line_number, &mut out);
        }
    }
    out
}

fn collect_executed(atom: &Atom, line_number: usize, out: &mut Vec<(usize, Arc<ExecutedCommand>)>) {
    match atom {
        Atom::Plain(_) | Atom::Command(_) => {}
        Atom::Group(group) => {
            for part in &group.parts {
                collect_executed(&part.atom, line_number, out);
            }
        }
        Atom::Compact(compact) => {
            for inner in &compact.parts {
                collect_executed(inner, line_number, out);
            }
        }
        Atom::Executed(cmd) => {
            // Arguments resolved before the command itself ran.
            for part in &cmd.arguments {
                collect_executed(&part.atom, line_number, out);
            }
            out.push((line_number, Arc::clone(cmd)));
        }
    }
}

/// Whether a resolved line is an executed owner command
pub fn owner_of(line: &Line) -> Option<&Arc<ExecutedCommand>> {
    match line.atoms.as_slice() {
        [Atom::Executed(cmd)] if cmd.style == CommandStyle::Line => Some(cmd),
        _ => None,
    }
}
