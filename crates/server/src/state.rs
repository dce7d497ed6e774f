//! Application state shared across handlers.

use regsync_core::config::AppConfig;
use regsync_metadata::MetadataStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: AppConfig, metadata: Arc<dyn MetadataStore>) -> Self {
        if config.webhook.secret().is_none() {
            tracing::warn!("webhook.secret is not set; webhook requests are accepted without a token");
        }

        Self {
            config: Arc::new(config),
            metadata,
        }
    }

    /// Upper bound for a single store transition.
    pub fn store_timeout(&self) -> Duration {
        self.config.webhook.store_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regsync_metadata::SqliteStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn store_timeout_zero_uses_default() {
        let temp = tempdir().unwrap();
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(temp.path().join("meta.db")).await.unwrap());

        let mut config = AppConfig::for_testing();
        config.webhook.store_timeout_secs = 0;
        let state = AppState::new(config, metadata);

        assert_eq!(state.store_timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn store_timeout_respects_config() {
        let temp = tempdir().unwrap();
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(temp.path().join("meta.db")).await.unwrap());

        let mut config = AppConfig::for_testing();
        config.webhook.store_timeout_secs = 3;
        let state = AppState::new(config, metadata);

        assert_eq!(state.store_timeout(), Duration::from_secs(3));
    }
}
