//! Configuration types shared across crates.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Host used when the database connection is assembled from discrete credentials.
pub const DEFAULT_PG_HOST: &str = "postgres";

/// Port used when the database connection is assembled from discrete credentials.
pub const DEFAULT_PG_PORT: u16 = 5432;

/// Database name used when `PG_DB` is not set.
pub const DEFAULT_PG_DATABASE: &str = "platform";

/// Header carrying the shared webhook secret.
pub const DEFAULT_TOKEN_HEADER: &str = "X-Webhook-Token";

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Webhook ingress configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret expected from the registry. When unset, the webhook is
    /// accepted without authentication.
    /// WARNING: Prefer the WEBHOOK_SECRET env var over storing it in config.
    #[serde(default)]
    pub secret: Option<String>,
    /// Request header carrying the secret.
    #[serde(default = "default_token_header")]
    pub token_header: String,
    /// Upper bound for a single store transition, in seconds.
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

fn default_token_header() -> String {
    DEFAULT_TOKEN_HEADER.to_string()
}

fn default_store_timeout_secs() -> u64 {
    10
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_header: default_token_header(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl WebhookConfig {
    /// Get the store timeout as a Duration. Zero falls back to the default.
    pub fn store_timeout(&self) -> Duration {
        match self.store_timeout_secs {
            0 => Duration::from_secs(default_store_timeout_secs()),
            secs => Duration::from_secs(secs),
        }
    }

    /// The configured secret, treating an empty string as unset.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Validate webhook configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.token_header.trim().is_empty() {
            return Err(Error::Config(
                "webhook.token_header must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (local development and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer PG_PASSWORD or REGSYNC_METADATA__PASSWORD over storing in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds. PostgreSQL cancels queries
        /// that exceed this duration.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(DEFAULT_PG_PORT)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/regsync.db"),
        }
    }
}

impl MetadataConfig {
    /// PostgreSQL configuration from a single connection URL.
    pub fn postgres_url(url: impl Into<String>) -> Self {
        Self::Postgres {
            url: Some(url.into()),
            host: None,
            port: default_pg_port(),
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: default_max_connections(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }

    /// PostgreSQL configuration from discrete credentials against the fixed
    /// default host and port.
    pub fn postgres_credentials(
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self::Postgres {
            url: None,
            host: Some(DEFAULT_PG_HOST.to_string()),
            port: Some(DEFAULT_PG_PORT),
            username: Some(username.into()),
            password: Some(password.into()),
            database: Some(database.into()),
            ssl_mode: None,
            max_connections: default_max_connections(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }

    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<()> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err(Error::Config(
                        "metadata.max_connections must be at least 1".to_string(),
                    ));
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(Error::Config(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    )),
                    (None, Some(_), None) => Err(Error::Config(
                        "postgres config with 'host' also requires 'database'".to_string(),
                    )),
                }
            }
        }
    }
}

/// Deployment environment variables understood in addition to the
/// `REGSYNC_`-prefixed configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyEnv {
    /// Database configuration from `DATABASE_URL` or `PG_USER`/`PG_PASSWORD`/`PG_DB`.
    pub metadata: Option<MetadataConfig>,
    /// `WEBHOOK_SECRET`.
    pub webhook_secret: Option<String>,
    /// `PORT`.
    pub port: Option<u16>,
}

impl LegacyEnv {
    /// Read the deployment variables through `lookup`.
    ///
    /// Empty values count as unset. `DATABASE_URL` wins over discrete
    /// credentials; discrete credentials need both `PG_USER` and `PG_PASSWORD`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let metadata = match (get("DATABASE_URL"), get("PG_USER"), get("PG_PASSWORD")) {
            (Some(url), _, _) => Some(MetadataConfig::postgres_url(url)),
            (None, Some(user), Some(password)) => {
                let database = get("PG_DB").unwrap_or_else(|| DEFAULT_PG_DATABASE.to_string());
                Some(MetadataConfig::postgres_credentials(user, password, database))
            }
            (None, None, None) => None,
            (None, _, _) => {
                return Err(Error::Config(
                    "DATABASE_URL or both PG_USER and PG_PASSWORD must be set".to_string(),
                ));
            }
        };

        let port = match get("PORT") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .map_err(|e| Error::Config(format!("invalid PORT '{raw}': {e}")))?,
            ),
            None => None,
        };

        Ok(Self {
            metadata,
            webhook_secret: get("WEBHOOK_SECRET"),
            port,
        })
    }

    /// Read the deployment variables from the process environment.
    pub fn from_process_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Whether any deployment variable was present.
    pub fn is_empty(&self) -> bool {
        self.metadata.is_none() && self.webhook_secret.is_none() && self.port.is_none()
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Webhook ingress configuration.
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses SQLite metadata and no webhook secret.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Overlay deployment environment values onto this configuration.
    pub fn apply_legacy_env(&mut self, env: LegacyEnv) {
        if let Some(metadata) = env.metadata {
            self.metadata = metadata;
        }
        if let Some(secret) = env.webhook_secret {
            self.webhook.secret = Some(secret);
        }
        if let Some(port) = env.port {
            self.server.bind = format!("0.0.0.0:{port}");
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<()> {
        self.webhook.validate()?;
        self.metadata.validate()
    }
}
