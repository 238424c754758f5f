//! Relay server configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatHub;
use crate::store::{MemoryStore, MessageStore, SqliteStore};
use tracing::info;

/// Configuration for the relay server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Root directory for server data
    pub data_dir: PathBuf,
    /// SQLite database file; `None` keeps messages in memory only
    pub database_path: Option<PathBuf>,
    /// HTTP listen port
    pub port: u16,
    /// Longest accepted message, in characters
    pub max_message_len: usize,
    /// Interval between WebSocket pings
    pub ping_interval: Duration,
    /// How long a ping may go unanswered before the connection is dropped
    pub pong_timeout: Duration,
}

/// `memory` keeps everything in process; unset falls back to a file under
/// the data directory
fn database_path_from(value: Option<String>, data_dir: &Path) -> Option<PathBuf> {
    match value {
        Some(path) if path == "memory" => None,
        Some(path) => Some(PathBuf::from(path)),
        None => Some(data_dir.join("relay.sqlite")),
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = std::env::var("RELAY_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("relay_data"));

        let database_path = database_path_from(std::env::var("DATABASE_PATH").ok(), &data_dir);

        Self {
            data_dir,
            database_path,
            port: env_or("PORT", 5000),
            max_message_len: env_or("MAX_MESSAGE_LEN", 5000),
            ping_interval: Duration::from_secs(env_or("PING_INTERVAL_SECS", 30)),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        let base = base_dir.into();
        config.database_path = Some(base.join("relay.sqlite"));
        config.data_dir = base;
        config
    }

    /// Config that touches no disk at all
    pub fn in_memory() -> Self {
        Self {
            database_path: None,
            ..Self::default()
        }
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        if let Some(parent) = self.database_path.as_ref().and_then(|p| p.parent()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Open the configured message store
    pub async fn open_store(&self) -> anyhow::Result<Arc<dyn MessageStore>> {
        match &self.database_path {
            Some(path) => {
                self.ensure_dirs().await?;
                Ok(Arc::new(SqliteStore::open(path).await?))
            }
            None => {
                info!("[Store] No database configured, using in-memory store");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn MessageStore>,
    pub hub: Arc<ChatHub>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn MessageStore>) -> Self {
        let hub = Arc::new(ChatHub::new(store.clone(), config.max_message_len));
        Self { config, store, hub }
    }
}
