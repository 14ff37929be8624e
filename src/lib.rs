//! Shared fixtures for ChatCmd end-to-end tests

use std::sync::{Arc, Once};

use async_trait::async_trait;
use chatcmd_commands::{
    handler_fn, message_as_raw, ArgumentView, CommandDescriptor, CommandRegistry, CommandResult,
    CommandStyles, InvocationContext, Outcome, Piece,
};

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .try_init();
    });
}

/// Concatenated text of a piece list, rich pieces skipped
pub fn text_of(pieces: &[Piece]) -> String {
    pieces.iter().filter_map(Piece::as_text).collect()
}

fn square(_: &mut InvocationContext<'_>, args: &[ArgumentView]) -> anyhow::Result<Outcome> {
    let Some(n) = args.first().and_then(ArgumentView::number) else {
        return Ok(Outcome::Error("usage: square <number>".into()));
    };
    Ok(Outcome::Record(
        CommandResult::new()
            .with_embedded_text(format!("{}", n * n))
            .with_response_text(format!("square of {} is {}", n, n * n))
            .with_embedding_raw(serde_json::json!({ "value": n * n })),
    ))
}

fn list(ctx: &mut InvocationContext<'_>, _: &[ArgumentView]) -> anyhow::Result<Outcome> {
    let Some(info) = ctx.line else {
        return Ok(Outcome::Empty);
    };
    if info.following_lines.is_empty() {
        return Ok(Outcome::Error("list needs at least one item".into()));
    }
    let items: Vec<String> = info
        .following_lines
        .iter()
        .enumerate()
        .map(|(idx, line)| format!("{}. {}", idx + 1, text_of(&message_as_raw(std::slice::from_ref(line)))))
        .collect();
    Ok(Outcome::Text(items.join("\n")))
}

/// Handler that yields to the runtime before answering
pub struct Delayed;

#[async_trait]
impl chatcmd_commands::CommandHandler for Delayed {
    async fn handle(
        &self,
        ctx: &mut InvocationContext<'_>,
        args: &[ArgumentView],
    ) -> anyhow::Result<Outcome> {
        tokio::task::yield_now().await;
        let who = args
            .first()
            .and_then(ArgumentView::mention)
            .unwrap_or(ctx.message.sender);
        Ok(Outcome::Text(format!("pong {}", who)))
    }
}

/// Registry with a representative set of commands
pub fn demo_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    let commands = vec![
        CommandDescriptor::new("square", "Square", handler_fn(square))
            .with_description("Square a number"),
        CommandDescriptor::new(
            "echo",
            "Echo",
            handler_fn(|_, args| {
                let words: Vec<String> = args.iter().filter_map(ArgumentView::text).collect();
                Ok(Outcome::Text(words.join(" ")))
            }),
        )
        .with_styles(CommandStyles::LINE),
        CommandDescriptor::new("list", "List", handler_fn(list))
            .with_description("Number the lines that follow")
            .with_styles(CommandStyles::LINE),
        CommandDescriptor::new(
            "upper",
            "Upper",
            handler_fn(|_, args| {
                let text: Vec<String> = args.iter().filter_map(ArgumentView::text).collect();
                Ok(Outcome::Text(text.join(" ").to_uppercase()))
            }),
        )
        .with_styles(CommandStyles::EMBEDDED),
        CommandDescriptor::new(
            "reset",
            "Reset",
            handler_fn(|_, _| Ok(Outcome::Text("state cleared".into()))),
        )
        .with_styles(CommandStyles::LINE)
        .with_exclusive(true),
        CommandDescriptor::new("ping", "Ping", Arc::new(Delayed)),
    ];
    for command in commands {
        registry
            .register(command)
            .expect("demo keywords are valid and distinct");
    }
    registry
}
