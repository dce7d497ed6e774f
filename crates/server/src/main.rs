//! regsync webhook receiver binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use regsync_core::config::{AppConfig, LegacyEnv};
use regsync_server::{AppState, create_router};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ENV_PREFIX: &str = "REGSYNC_";
const CONFIG_PATH_ENV: &str = "REGSYNC_CONFIG";

/// regsyncd - keeps image pull state in sync with registry webhooks
#[derive(Parser, Debug)]
#[command(name = "regsyncd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "REGSYNC_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Layer the configuration file, `REGSYNC_*` variables and the deployment
/// variables, in that order.
fn load_config(config_file: &str) -> Result<AppConfig> {
    let config_path = Path::new(config_file);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %config_file, "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::debug!("No config file found at {}", config_file);
    }

    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with(ENV_PREFIX) && key != CONFIG_PATH_ENV);
    let legacy = LegacyEnv::from_process_env().context("invalid deployment environment")?;

    if !has_config_file && !has_env_config && legacy.is_empty() {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: regsyncd --config /path/to/config.toml\n  \
             2. Environment variables: REGSYNC_METADATA__TYPE=postgres \
             REGSYNC_METADATA__URL=postgres://... regsyncd\n  \
             3. Deployment variables: DATABASE_URL or PG_USER/PG_PASSWORD/PG_DB, \
             WEBHOOK_SECRET, PORT\n\n\
             Set REGSYNC_CONFIG to specify a default config file path."
        );
    }

    let mut config: AppConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.apply_legacy_env(legacy);
    config.validate().context("invalid configuration")?;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("regsyncd v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    regsync_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = regsync_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("Metadata store initialized");

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    let state = AppState::new(config, metadata);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
