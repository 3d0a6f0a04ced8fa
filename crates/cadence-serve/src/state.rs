//! Application state and configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::signing::DEFAULT_TIMESTAMP_WINDOW;
use cadence_pipeline::{BufferClient, BufferConfig, Publisher, PublisherApi, Store};

use crate::cooldown::Cooldown;

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:3000").
    pub bind_addr: String,

    /// SQLite database path.
    pub db_path: PathBuf,

    /// Shared secret verifying approval-link signatures.
    pub webhook_secret: String,

    /// Accepted age of an approval-link timestamp.
    pub timestamp_window: Duration,

    /// Per-post cooldown between webhook actions.
    pub cooldown_window: Duration,

    /// Publisher API base URL.
    pub buffer_url: String,

    /// Publisher API access token.
    pub buffer_token: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `CADENCE_WEBHOOK_SECRET`: Secret for approval-link signatures
    /// - `BUFFER_ACCESS_TOKEN`: Publisher API token
    ///
    /// Optional environment variables:
    /// - `CADENCE_BIND_ADDR`: Server bind address (default: "0.0.0.0:3000")
    /// - `CADENCE_DB`: SQLite path (default: "./data/cadence.db")
    /// - `CADENCE_TIMESTAMP_WINDOW_SECS`: Link validity window (default: 900)
    /// - `CADENCE_COOLDOWN_SECS`: Per-post action cooldown (default: 60)
    /// - `BUFFER_API_URL`: Publisher API base URL
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr =
            std::env::var("CADENCE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let db_path: PathBuf = std::env::var("CADENCE_DB")
            .unwrap_or_else(|_| "./data/cadence.db".to_string())
            .into();

        let webhook_secret = std::env::var("CADENCE_WEBHOOK_SECRET")
            .map_err(|_| anyhow::anyhow!("CADENCE_WEBHOOK_SECRET environment variable is required"))?;
        if webhook_secret.trim().is_empty() {
            anyhow::bail!("CADENCE_WEBHOOK_SECRET must not be empty");
        }

        let timestamp_window = std::env::var("CADENCE_TIMESTAMP_WINDOW_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMESTAMP_WINDOW);

        let cooldown_window = std::env::var("CADENCE_COOLDOWN_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        let buffer_url = std::env::var("BUFFER_API_URL")
            .unwrap_or_else(|_| "https://api.bufferapp.com/1".to_string());

        let buffer_token = std::env::var("BUFFER_ACCESS_TOKEN")
            .map_err(|_| anyhow::anyhow!("BUFFER_ACCESS_TOKEN environment variable is required"))?;

        tracing::info!(
            bind_addr = %bind_addr,
            db_path = %db_path.display(),
            window_secs = timestamp_window.as_secs(),
            cooldown_secs = cooldown_window.as_secs(),
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            db_path,
            webhook_secret,
            timestamp_window,
            cooldown_window,
            buffer_url,
            buffer_token,
        })
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// SQLite-backed post store.
    pub store: Arc<Store>,

    /// Publish orchestrator (store + remote API).
    pub publisher: Arc<Publisher>,

    /// Per-post action cooldown cache.
    pub cooldown: Cooldown,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Create application state from configuration, opening the store and
    /// the real publisher API client.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(Store::open(&config.db_path)?);
        let client = BufferClient::new(BufferConfig::new(&config.buffer_url, &config.buffer_token))?;
        Ok(Self::with_parts(config, store, Arc::new(client)))
    }

    /// Assemble state from pre-built parts. Tests inject a fake API here.
    pub fn with_parts(config: Config, store: Arc<Store>, api: Arc<dyn PublisherApi>) -> Self {
        let publisher = Arc::new(Publisher::new(Arc::clone(&store), api));
        let cooldown = Cooldown::new(config.cooldown_window);
        Self {
            store,
            publisher,
            cooldown,
            config: Arc::new(config),
        }
    }
}
