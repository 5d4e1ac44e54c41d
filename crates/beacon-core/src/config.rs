//! Configuration for the SDK and CLI.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default ingestion host.
pub const DEFAULT_API_HOST: &str = "https://ingest.beacon.dev";

/// Default storage key for the persisted queue snapshot.
pub const DEFAULT_STORAGE_KEY: &str = "beacon_queue";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_FLUSH_SIZE: usize = 20;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1_000;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;

const ENV_API_KEY: &str = "BEACON_API_KEY";
const ENV_API_HOST: &str = "BEACON_API_HOST";
const ENV_LOG_LEVEL: &str = "BEACON_LOG_LEVEL";

/// SDK configuration as stored in `config.json`.
///
/// Every field has a default so partial files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ingestion host, e.g. `https://ingest.beacon.dev`.
    pub api_host: String,
    /// Project API key.
    pub api_key: String,
    /// Period of the automatic flush timer.
    pub flush_interval_ms: u64,
    /// Maximum events per batch; reaching it triggers a flush.
    pub flush_size: usize,
    /// Maximum pending events before the oldest are evicted.
    pub max_queue_size: usize,
    /// Upper bound on a single send attempt.
    pub send_timeout_ms: u64,
    /// First backoff window after a retryable failure.
    pub backoff_base_ms: u64,
    /// Cap on the backoff window.
    pub backoff_max_ms: u64,
    /// Gzip normal batch uploads.
    pub compression: bool,
    /// Key under which the pending queue snapshot is stored.
    pub storage_key: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            api_key: String::new(),
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            flush_size: DEFAULT_FLUSH_SIZE,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            compression: true,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden from the environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load `config.json` if it exists, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Write configuration to `config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `BEACON_*` overrides from `lookup`. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = read(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(host) = read(ENV_API_HOST) {
            self.api_host = host;
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
    }

    /// Parsed ingestion host.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_host).map_err(CoreError::from)
    }

    /// Check the values the delivery queue depends on.
    pub fn validate(&self) -> CoreResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(CoreError::Config("api_key must not be empty".to_string()));
        }
        self.api_url()?;
        if self.flush_size == 0 {
            return Err(CoreError::Config("flush_size must be at least 1".to_string()));
        }
        if self.max_queue_size == 0 {
            return Err(CoreError::Config(
                "max_queue_size must be at least 1".to_string(),
            ));
        }
        if self.flush_size > self.max_queue_size {
            return Err(CoreError::Config(format!(
                "flush_size ({}) must not exceed max_queue_size ({})",
                self.flush_size, self.max_queue_size
            )));
        }
        if self.flush_interval_ms == 0 {
            return Err(CoreError::Config(
                "flush_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(CoreError::Config(
                "send_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.storage_key.trim().is_empty() {
            return Err(CoreError::Config("storage_key must not be empty".to_string()));
        }
        Ok(())
    }

    /// Queue tuning derived from this configuration.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            flush_size: self.flush_size.max(1),
            max_queue_size: self.max_queue_size.max(1),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            compression: self.compression,
        }
    }
}

/// Tuning of the delivery queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub flush_interval: Duration,
    pub flush_size: usize,
    pub max_queue_size: usize,
    pub send_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub compression: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Config::default().queue_config()
    }
}
