//! Per-scope settings consumed by the message pipeline

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::Result;
use crate::types::Scope;

/// Source of per-scope prefix and activity settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Prefix set for a scope; `None` leaves the configured default in effect
    async fn get_prefix(&self, scope: Scope) -> Result<Option<String>>;

    /// Whether the bot has been disabled in a scope
    async fn is_activity_disabled(&self, scope: Scope) -> Result<bool>;
}

/// Settings kept in process memory
#[derive(Debug, Default)]
pub struct InMemorySettings {
    default_prefix: Option<String>,
    prefixes: RwLock<HashMap<Scope, String>>,
    disabled: RwLock<HashMap<Scope, bool>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix for every scope without its own, overriding the pipeline config
    pub fn with_default_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.default_prefix = Some(prefix.into());
        self
    }

    pub fn default_prefix(&self) -> Option<&str> {
        self.default_prefix.as_deref()
    }

    pub async fn set_prefix(&self, scope: Scope, prefix: impl Into<String>) {
        let prefix = prefix.into();
        info!(scope = %scope, prefix = %prefix, "Prefix changed");
        self.prefixes.write().await.insert(scope, prefix);
    }

    /// Revert a scope to the default prefix
    pub async fn clear_prefix(&self, scope: Scope) {
        self.prefixes.write().await.remove(&scope);
    }

    pub async fn set_activity_disabled(&self, scope: Scope, disabled: bool) {
        info!(scope = %scope, disabled, "Activity changed");
        self.disabled.write().await.insert(scope, disabled);
    }
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn get_prefix(&self, scope: Scope) -> Result<Option<String>> {
        Ok(self
            .prefixes
            .read()
            .await
            .get(&scope)
            .cloned()
            .or_else(|| self.default_prefix.clone()))
    }

    async fn is_activity_disabled(&self, scope: Scope) -> Result<bool> {
        Ok(self
            .disabled
            .read()
            .await
            .get(&scope)
            .copied()
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_falls_back_to_default() {
        let settings = InMemorySettings::new().with_default_prefix("!");
        let scope = Scope::Group(1);
        assert_eq!(settings.get_prefix(scope).await.unwrap().as_deref(), Some("!"));

        settings.set_prefix(scope, "#").await;
        assert_eq!(settings.get_prefix(scope).await.unwrap().as_deref(), Some("#"));
        assert_eq!(settings.get_prefix(Scope::Group(2)).await.unwrap().as_deref(), Some("!"));

        settings.clear_prefix(scope).await;
        assert_eq!(settings.get_prefix(scope).await.unwrap().as_deref(), Some("!"));
    }

    #[tokio::test]
    async fn test_no_prefix_without_default() {
        let settings = InMemorySettings::default();
        assert_eq!(settings.default_prefix(), None);
        assert_eq!(settings.get_prefix(Scope::Private(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_activity_flag() {
        let settings = InMemorySettings::default();
        let scope = Scope::Private(3);
        assert!(!settings.is_activity_disabled(scope).await.unwrap());
        settings.set_activity_disabled(scope, true).await;
        assert!(settings.is_activity_disabled(scope).await.unwrap());
    }
}
