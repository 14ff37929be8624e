//! Prefix trie of command keywords

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CommandError, Result};
use crate::types::CommandDescriptor;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    command: Option<Arc<CommandDescriptor>>,
}

/// Registry for looking up commands by keyword prefix
///
/// Owned by the bot instance and passed by reference into the tokenizer.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    root: TrieNode,
    count: usize,
}

impl CommandRegistry {
    /// Create a new empty command registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its keyword
    ///
    /// Fails on duplicate keywords and on keywords that are empty or contain
    /// whitespace, braces or a backslash.
    pub fn register(&mut self, command: CommandDescriptor) -> Result<()> {
        validate_keyword(&command.keyword)?;

        let mut node = &mut self.root;
        for ch in command.keyword.chars() {
            node = node.children.entry(ch).or_default();
        }
        if node.command.is_some() {
            return Err(CommandError::DuplicateKeyword(command.keyword));
        }

        debug!(keyword = %command.keyword, name = %command.display_name, "Registered command");
        node.command = Some(Arc::new(command));
        self.count += 1;
        Ok(())
    }

    /// Every registered keyword that is a prefix of `text`, shortest first
    pub fn match_prefix(&self, text: &str) -> Vec<Arc<CommandDescriptor>> {
        let mut matches = Vec::new();
        let mut node = &self.root;
        for ch in text.chars() {
            match node.children.get(&ch) {
                Some(next) => node = next,
                None => break,
            }
            if let Some(command) = &node.command {
                matches.push(Arc::clone(command));
            }
        }
        matches
    }

    /// Get a command by keyword
    pub fn get(&self, keyword: &str) -> Result<Arc<CommandDescriptor>> {
        let mut node = &self.root;
        for ch in keyword.chars() {
            node = node
                .children
                .get(&ch)
                .ok_or_else(|| CommandError::CommandNotFound(keyword.to_string()))?;
        }
        node.command
            .clone()
            .ok_or_else(|| CommandError::CommandNotFound(keyword.to_string()))
    }

    /// Check if a command exists
    pub fn exists(&self, keyword: &str) -> bool {
        self.get(keyword).is_ok()
    }

    /// Get the number of registered commands
    pub fn count(&self) -> usize {
        self.count
    }

    /// Get all commands in keyword order
    pub fn list_all(&self) -> Vec<Arc<CommandDescriptor>> {
        let mut out = Vec::with_capacity(self.count);
        collect(&self.root, &mut out);
        out
    }

    /// Search commands by display name or description
    pub fn search(&self, query: &str) -> Vec<Arc<CommandDescriptor>> {
        let query_lower = query.to_lowercase();
        self.list_all()
            .into_iter()
            .filter(|cmd| {
                cmd.display_name.to_lowercase().contains(&query_lower)
                    || cmd.description.to_lowercase().contains(&query_lower)
            })
            .collect()
    }
}

fn collect(node: &TrieNode, out: &mut Vec<Arc<CommandDescriptor>>) {
    if let Some(command) = &node.command {
        out.push(Arc::clone(command));
    }
    for child in node.children.values() {
        collect(child, out);
    }
}

fn validate_keyword(keyword: &str) -> Result<()> {
    let invalid = keyword.is_empty()
        || keyword
            .chars()
            .any(|ch| ch.is_whitespace() || matches!(ch, '{' | '}' | '\\'));
    if invalid {
        return Err(CommandError::InvalidKeyword(keyword.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::handler_fn;
    use crate::types::Outcome;

    fn cmd(keyword: &str) -> CommandDescriptor {
        CommandDescriptor::new(keyword, keyword, handler_fn(|_, _| Ok(Outcome::Empty)))
    }

    fn keywords(found: &[Arc<CommandDescriptor>]) -> Vec<&str> {
        found.iter().map(|c| c.keyword.as_str()).collect()
    }

    #[test]
    fn test_register_command() {
        let mut registry = CommandRegistry::new();
        assert!(registry.register(cmd("test")).is_ok());
        assert_eq!(registry.count(), 1);
        assert!(registry.exists("test"));
        assert!(!registry.exists("tes"));
    }

    #[test]
    fn test_register_duplicate_command() {
        let mut registry = CommandRegistry::new();
        assert!(registry.register(cmd("test")).is_ok());
        assert!(matches!(
            registry.register(cmd("test")),
            Err(CommandError::DuplicateKeyword(_))
        ));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_register_invalid_keywords() {
        let mut registry = CommandRegistry::new();
        for bad in ["", "a b", "a\nb", "a{", "}a", "a\\b"] {
            assert!(
                matches!(registry.register(cmd(bad)), Err(CommandError::InvalidKeyword(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_match_prefix_shortest_first() {
        let mut registry = CommandRegistry::new();
        registry.register(cmd("fooo")).unwrap();
        registry.register(cmd("fo")).unwrap();
        registry.register(cmd("foo")).unwrap();

        assert_eq!(keywords(&registry.match_prefix("foo")), vec!["fo", "foo"]);
        assert_eq!(
            keywords(&registry.match_prefix("foooobar")),
            vec!["fo", "foo", "fooo"]
        );
        assert!(registry.match_prefix("f").is_empty());
        assert!(registry.match_prefix("").is_empty());
    }

    #[test]
    fn test_match_prefix_multibyte() {
        let mut registry = CommandRegistry::new();
        registry.register(cmd("骰")).unwrap();
        registry.register(cmd("骰子")).unwrap();
        assert_eq!(keywords(&registry.match_prefix("骰子 2d6")), vec!["骰", "骰子"]);
    }

    #[test]
    fn test_get_nonexistent_command() {
        let registry = CommandRegistry::new();
        assert!(matches!(
            registry.get("nonexistent"),
            Err(CommandError::CommandNotFound(_))
        ));
    }

    #[test]
    fn test_list_all_in_keyword_order() {
        let mut registry = CommandRegistry::new();
        registry.register(cmd("b")).unwrap();
        registry.register(cmd("ab")).unwrap();
        registry.register(cmd("a")).unwrap();
        assert_eq!(keywords(&registry.list_all()), vec!["a", "ab", "b"]);
    }

    #[test]
    fn test_search_commands() {
        let mut registry = CommandRegistry::new();
        registry
            .register(cmd("roll").with_description("Roll some dice"))
            .unwrap();
        registry.register(cmd("help")).unwrap();
        assert_eq!(keywords(&registry.search("DICE")), vec!["roll"]);
    }
}
