//! Handler contract and per-site candidate resolution
//!
//! A command site is resolved by trying its candidates longest first:
//! - a candidate returning nothing is a no-match and the next one is tried
//! - an explicit error is remembered (only the first one) and the next one is tried
//! - a handler failure ends the search with a system error
//! - a success ends the search and discards any remembered error

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::argument::ArgumentView;
use crate::atom::{glue, Atom, ExecutedCommand, Part, UnexecutedCommand};
use crate::context::{ExecuteContext, InvocationContext, LineInfo, SlotId};
use crate::types::{CommandDescriptor, CommandResult, CommandStyle, Note, Outcome, Piece};

/// Note recorded when an embedded command yields no inline value
pub const NO_EMBEDDING: &str = "embedded command produced no embedding";

/// Note recorded when an embedded command both claims and returns content
pub const EMBEDDED_CLAIM_CONFLICT: &str = "embedded command claimed execution manually";

/// Note recorded when a handler fails; the underlying error is only logged
pub const HANDLER_FAILED: &str = "command handler failed unexpectedly";

const REDUNDANT_CLAIM: &str = "redundant manual claim";
const CONTENT_AFTER_ERROR: &str = "content returned after reporting an error was discarded";

/// Callback invoked for a registered keyword
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one invocation
    ///
    /// Returning `Err` is treated as a handler failure: the site is marked
    /// failed with a generic system error and the error itself is only logged.
    async fn handle(
        &self,
        ctx: &mut InvocationContext<'_>,
        args: &[ArgumentView],
    ) -> anyhow::Result<Outcome>;
}

/// Adapter turning a synchronous closure into a [`CommandHandler`]
pub struct FnHandler<F>(F);

#[async_trait::async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&mut InvocationContext<'_>, &[ArgumentView]) -> anyhow::Result<Outcome> + Send + Sync,
{
    async fn handle(
        &self,
        ctx: &mut InvocationContext<'_>,
        args: &[ArgumentView],
    ) -> anyhow::Result<Outcome> {
        (self.0)(ctx, args)
    }
}

/// Wrap a synchronous closure as a shareable handler
pub fn handler_fn<F>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(&mut InvocationContext<'_>, &[ArgumentView]) -> anyhow::Result<Outcome>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHandler(f))
}

/// Classified result of one handler invocation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Verdict {
    NoMatch,
    UserError(String, Vec<Note>),
    SystemError(String),
    Success(CommandResult, Vec<Note>),
}

/// Map a handler's outcome and manual signals to a verdict
pub(crate) fn process_outcome(
    outcome: Outcome,
    style: CommandStyle,
    claimed: bool,
    reported_error: Option<String>,
) -> Verdict {
    let content = match outcome {
        Outcome::Error(message) => return Verdict::UserError(message, Vec::new()),
        Outcome::Empty => None,
        Outcome::Text(text) => Some(content_for(style, vec![Piece::Text(text)])),
        Outcome::Pieces(pieces) => Some(content_for(style, pieces)),
        Outcome::Record(result) => Some(result),
    };

    if let Some(message) = reported_error {
        let notes = match content {
            Some(_) => vec![Note::system_warn(CONTENT_AFTER_ERROR)],
            None => Vec::new(),
        };
        return Verdict::UserError(message, notes);
    }

    match (content, style, claimed) {
        (None, _, false) => Verdict::NoMatch,
        (None, CommandStyle::Line, true) => Verdict::Success(CommandResult::default(), Vec::new()),
        (None, CommandStyle::Embedded, true) => Verdict::SystemError(NO_EMBEDDING.to_string()),
        (Some(result), CommandStyle::Embedded, _) if result.embedding.is_none() => {
            Verdict::SystemError(NO_EMBEDDING.to_string())
        }
        (Some(_), CommandStyle::Embedded, true) => {
            Verdict::SystemError(EMBEDDED_CLAIM_CONFLICT.to_string())
        }
        (Some(result), CommandStyle::Embedded, false) => Verdict::Success(result, Vec::new()),
        (Some(result), CommandStyle::Line, true) => {
            Verdict::Success(result, vec![Note::system_warn(REDUNDANT_CLAIM)])
        }
        (Some(result), CommandStyle::Line, false) => Verdict::Success(result, Vec::new()),
    }
}

fn content_for(style: CommandStyle, pieces: Vec<Piece>) -> CommandResult {
    match style {
        CommandStyle::Embedded => CommandResult::new().with_embedding(pieces),
        CommandStyle::Line => CommandResult::new().with_response(pieces),
    }
}

/// Prepend the keyword characters a shorter candidate did not consume onto argument 0
pub(crate) fn splice_leftover(
    head_gap: &str,
    arguments: &[Part],
    leftover: &str,
) -> (String, Vec<Part>) {
    let mut arguments = arguments.to_vec();
    if leftover.is_empty() {
        return (head_gap.to_string(), arguments);
    }
    if head_gap.is_empty() && !arguments.is_empty() {
        let first = arguments.remove(0);
        let atom = glue(vec![Atom::text(leftover), first.atom]).unwrap_or_else(|| Atom::text(leftover));
        arguments.insert(0, Part::new(atom, first.gap));
    } else {
        arguments.insert(0, Part::new(Atom::text(leftover), head_gap));
    }
    (String::new(), arguments)
}

/// Settings that change which candidates are eligible
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Eligibility<'a> {
    pub disabled: bool,
    pub line: Option<LineInfo<'a>>,
}

/// Resolve one command site against its candidates
///
/// Returns `None` when every candidate declined; the caller then treats the
/// site as literal text.
pub(crate) async fn resolve_command(
    ctx: &mut ExecuteContext,
    slot_id: SlotId,
    cmd: &UnexecutedCommand,
    arguments: &[Part],
    eligibility: Eligibility<'_>,
) -> Option<ExecutedCommand> {
    let longest = cmd.candidates.len().checked_sub(1)?;
    let exclusive_ok = matches!(eligibility.line, Some(info) if info.owner_count == 1);
    let mut first_error: Option<ExecutedCommand> = None;

    for (idx, candidate) in cmd.candidates.iter().enumerate().rev() {
        let squeezed = if idx == longest {
            cmd.head_gap.is_empty() && !arguments.is_empty()
        } else {
            true
        };
        if !candidate.accepts(cmd.style, squeezed) {
            continue;
        }
        if eligibility.disabled && !candidate.runs_while_disabled {
            debug!(slot = %slot_id, keyword = %candidate.keyword, "Skipped while disabled");
            continue;
        }
        if candidate.exclusive && !exclusive_ok {
            debug!(slot = %slot_id, keyword = %candidate.keyword, "Skipped exclusive command");
            continue;
        }

        let leftover = cmd
            .matched_keyword
            .get(candidate.keyword.len()..)
            .unwrap_or_default();
        let (head_gap, spliced) = splice_leftover(&cmd.head_gap, arguments, leftover);
        let views: Vec<ArgumentView> = spliced
            .iter()
            .map(|part| ArgumentView::new(part.atom.clone()))
            .collect();

        let invocation_id = ctx.begin_invocation();
        let verdict = {
            let mut invocation = InvocationContext::new(
                ctx.message(),
                slot_id,
                invocation_id,
                cmd.style,
                cmd.is_await(),
                &cmd.prefix,
                &candidate.keyword,
                eligibility.line,
            );
            invoke(candidate, &mut invocation, &views).await
        };
        debug!(
            slot = %slot_id,
            invocation = %invocation_id,
            keyword = %candidate.keyword,
            style = %cmd.style,
            verdict = ?verdict,
            "Invoked command"
        );

        let executed = |result: CommandResult, has_failed: bool, notes: Vec<Note>| ExecutedCommand {
            slot_id,
            descriptor: Arc::clone(candidate),
            style: cmd.style,
            prefix: cmd.prefix.clone(),
            await_marker: cmd.await_marker.clone(),
            left_pad: cmd.left_pad.clone(),
            head_gap: head_gap.clone(),
            arguments: spliced.clone(),
            result,
            has_failed,
            notes,
        };

        match verdict {
            Verdict::NoMatch => continue,
            Verdict::UserError(message, mut notes) => {
                if first_error.is_none() {
                    notes.insert(0, Note::user_error(message));
                    first_error = Some(executed(CommandResult::default(), true, notes));
                }
            }
            Verdict::SystemError(content) => {
                return Some(executed(
                    CommandResult::default(),
                    true,
                    vec![Note::system_error(content)],
                ));
            }
            Verdict::Success(result, notes) => {
                for note in &notes {
                    warn!(slot = %slot_id, keyword = %candidate.keyword, note = %note.content, "Command warning");
                }
                return Some(executed(result, false, notes));
            }
        }
    }

    first_error
}

async fn invoke(
    candidate: &CommandDescriptor,
    invocation: &mut InvocationContext<'_>,
    args: &[ArgumentView],
) -> Verdict {
    let outcome = AssertUnwindSafe(candidate.handler.handle(invocation, args))
        .catch_unwind()
        .await;
    let claimed = invocation.is_claimed();
    let reported_error = invocation.take_reported_error();

    match outcome {
        Ok(Ok(outcome)) => process_outcome(outcome, invocation.style, claimed, reported_error),
        Ok(Err(err)) => {
            error!(keyword = %candidate.keyword, error = ?err, "Command handler returned an error");
            Verdict::SystemError(HANDLER_FAILED.to_string())
        }
        Err(_) => {
            error!(keyword = %candidate.keyword, "Command handler panicked");
            Verdict::SystemError(HANDLER_FAILED.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::CompactComplex;

    #[test]
    fn test_empty_without_claim_is_no_match() {
        assert_eq!(
            process_outcome(Outcome::Empty, CommandStyle::Line, false, None),
            Verdict::NoMatch
        );
    }

    #[test]
    fn test_claimed_line_is_silent_success() {
        assert_eq!(
            process_outcome(Outcome::Empty, CommandStyle::Line, true, None),
            Verdict::Success(CommandResult::default(), Vec::new())
        );
    }

    #[test]
    fn test_claimed_embedded_without_embedding_fails() {
        assert_eq!(
            process_outcome(Outcome::Empty, CommandStyle::Embedded, true, None),
            Verdict::SystemError(NO_EMBEDDING.to_string())
        );
    }

    #[test]
    fn test_embedded_record_without_embedding_fails() {
        let record = CommandResult::new().with_response_text("hi");
        assert_eq!(
            process_outcome(Outcome::Record(record), CommandStyle::Embedded, false, None),
            Verdict::SystemError(NO_EMBEDDING.to_string())
        );
    }

    #[test]
    fn test_embedded_claim_conflict() {
        assert_eq!(
            process_outcome(Outcome::Text("4".into()), CommandStyle::Embedded, true, None),
            Verdict::SystemError(EMBEDDED_CLAIM_CONFLICT.to_string())
        );
    }

    #[test]
    fn test_text_fills_style_specific_field() {
        match process_outcome(Outcome::Text("x".into()), CommandStyle::Embedded, false, None) {
            Verdict::Success(result, notes) => {
                assert_eq!(result.embedding, Some(vec![Piece::text("x")]));
                assert!(result.response.is_none());
                assert!(notes.is_empty());
            }
            other => panic!("unexpected verdict {:?}", other),
        }
        match process_outcome(Outcome::Text("x".into()), CommandStyle::Line, true, None) {
            Verdict::Success(result, notes) => {
                assert_eq!(result.response, Some(vec![Piece::text("x")]));
                assert_eq!(notes, vec![Note::system_warn(REDUNDANT_CLAIM)]);
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn test_reported_error_wins() {
        assert_eq!(
            process_outcome(Outcome::Empty, CommandStyle::Line, false, Some("bad".into())),
            Verdict::UserError("bad".into(), Vec::new())
        );
        assert_eq!(
            process_outcome(
                Outcome::Text("x".into()),
                CommandStyle::Line,
                false,
                Some("bad".into())
            ),
            Verdict::UserError("bad".into(), vec![Note::system_warn(CONTENT_AFTER_ERROR)])
        );
    }

    #[test]
    fn test_splice_into_glued_text() {
        let (gap, args) = splice_leftover("", &[Part::new(Atom::text("bar"), " ")], "o");
        assert_eq!(gap, "");
        assert_eq!(args, vec![Part::new(Atom::text("obar"), " ")]);
    }

    #[test]
    fn test_splice_into_glued_compact() {
        let compact = Atom::Compact(CompactComplex {
            parts: vec![Atom::text("=x"), Atom::Plain(Piece::Mention { target: 1 })],
        });
        let (_, args) = splice_leftover("", &[Part::new(compact, "")], "o");
        assert_eq!(
            args[0].atom,
            Atom::Compact(CompactComplex {
                parts: vec![Atom::text("o=x"), Atom::Plain(Piece::Mention { target: 1 })],
            })
        );
    }

    #[test]
    fn test_splice_as_new_argument_after_gap() {
        let (gap, args) = splice_leftover(" ", &[Part::new(Atom::text("x"), "")], "bar");
        assert_eq!(gap, "");
        assert_eq!(
            args,
            vec![Part::new(Atom::text("bar"), " "), Part::new(Atom::text("x"), "")]
        );
    }

    #[test]
    fn test_splice_without_arguments() {
        let (gap, args) = splice_leftover("", &[], "o");
        assert_eq!(gap, "");
        assert_eq!(args, vec![Part::new(Atom::text("o"), "")]);
    }
}
