//! End-to-end tests: inbound message in, rendered gateway output out

use std::sync::Arc;

use chatcmd_commands::{
    CommandManager, CommandsConfig, ConfigManager, InMemorySettings, InboundMessage, Piece, Scope,
};
use chatcmd_integration_tests::{demo_registry, init_tracing, text_of};
use tempfile::TempDir;

const BOT: u64 = 4242;
const GROUP: Scope = Scope::Group(7);

fn manager_with(config: CommandsConfig) -> (CommandManager, Arc<InMemorySettings>) {
    init_tracing();
    let settings = Arc::new(InMemorySettings::default());
    let manager = CommandManager::new(demo_registry(), settings.clone()).with_config(config);
    (manager, settings)
}

fn manager() -> (CommandManager, Arc<InMemorySettings>) {
    manager_with(CommandsConfig {
        bot_id: Some(BOT),
        ..Default::default()
    })
}

async fn respond(manager: &CommandManager, pieces: Vec<Piece>) -> (Option<String>, Option<String>) {
    let output = manager
        .process(InboundMessage::new(1, GROUP, pieces))
        .await
        .expect("processing never fails with in-memory settings");
    match output {
        Some(output) => (
            output.embedding.as_deref().map(text_of),
            output.response.as_deref().map(text_of),
        ),
        None => (None, None),
    }
}

async fn respond_text(manager: &CommandManager, text: &str) -> (Option<String>, Option<String>) {
    respond(manager, vec![Piece::text(text)]).await
}

#[tokio::test]
async fn test_list_consumes_following_lines() {
    let (manager, _) = manager();
    let (embedding, response) = respond_text(&manager, "/list\nmilk\neggs {/square 3}").await;

    assert_eq!(embedding.as_deref(), Some("/list\nmilk\neggs «9»"));
    assert_eq!(
        response.as_deref(),
        Some("> /list\n1. milk\n2. eggs {/square 3}")
    );
}

#[tokio::test]
async fn test_list_without_items_reports_user_error() {
    let (manager, _) = manager();
    let (_, response) = respond_text(&manager, "/list").await;
    assert_eq!(response.as_deref(), Some("list needs at least one item"));
}

#[tokio::test]
async fn test_addressed_message_with_quote() {
    let (manager, _) = manager();
    let (_, response) = respond(
        &manager,
        vec![
            Piece::Quote { message_id: 9 },
            Piece::Mention { target: BOT },
            Piece::text(" /ping "),
            Piece::Mention { target: 55 },
        ],
    )
    .await;
    assert_eq!(response.as_deref(), Some("pong 55"));
}

#[tokio::test]
async fn test_async_handler_defaults_to_sender() {
    let (manager, _) = manager();
    let (_, response) = respond_text(&manager, "/ping").await;
    assert_eq!(response.as_deref(), Some("pong 1"));
}

#[tokio::test]
async fn test_embedded_only_command_in_text() {
    let (manager, _) = manager();
    let (embedding, response) = respond_text(&manager, "I said {/upper hello there}").await;
    assert_eq!(embedding.as_deref(), Some("I said «HELLO THERE»"));
    assert_eq!(response, None);

    // Line style is not supported, so the line stays literal.
    assert_eq!(respond_text(&manager, "/upper hi").await, (None, None));
}

#[tokio::test]
async fn test_exclusive_command_needs_to_be_alone() {
    let (manager, _) = manager();
    let (_, response) = respond_text(&manager, "/reset").await;
    assert_eq!(response.as_deref(), Some("state cleared"));

    let (_, response) = respond_text(&manager, "/reset\n/echo hi").await;
    assert_eq!(response.as_deref(), Some("> /echo hi\nhi"));
}

#[tokio::test]
async fn test_escaped_braces_render_literally() {
    let (manager, _) = manager();
    let (embedding, response) = respond_text(&manager, r"\{/square 2\} vs {/square 2}").await;
    assert_eq!(embedding.as_deref(), Some("{/square 2} vs «4»"));
    assert_eq!(response, None);
}

#[tokio::test]
async fn test_await_marker_is_accepted() {
    let (manager, _) = manager();
    let (_, response) = respond_text(&manager, "/~square 5").await;
    assert_eq!(response.as_deref(), Some("square of 5 is 25"));
}

#[tokio::test]
async fn test_long_preview_is_truncated() {
    let (manager, _) = manager();
    let (_, response) =
        respond_text(&manager, "/echo the quick brown fox jumps\n/echo again").await;
    assert_eq!(
        response.as_deref(),
        Some("> /echo the quick brow…\nthe quick brown fox jumps\n\n> /echo again\nagain")
    );
}

#[tokio::test]
async fn test_config_file_drives_pipeline() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chatcmd.yaml");
    std::fs::write(
        &path,
        "default_prefix: \"!\"\nbot_id: 4242\npreview_marker: \"# \"\nblock_separator: \"\\n---\\n\"\n",
    )
    .unwrap();

    let config = ConfigManager::load_from_file(&path).unwrap();
    let (manager, settings) = manager_with(config);

    let (_, response) = respond_text(&manager, "!square 2\n!echo ok").await;
    assert_eq!(
        response.as_deref(),
        Some("# !square 2\nsquare of 2 is 4\n---\n# !echo ok\nok")
    );

    settings.set_prefix(GROUP, ".").await;
    let (_, response) = respond_text(&manager, ".echo scoped").await;
    assert_eq!(response.as_deref(), Some("scoped"));
}

#[tokio::test]
async fn test_disabled_scope_is_silent() {
    let (manager, settings) = manager();
    settings.set_activity_disabled(GROUP, true).await;
    assert_eq!(respond_text(&manager, "/square 2\n{/square 3}").await, (None, None));
}
