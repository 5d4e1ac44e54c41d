//! CLI command implementations.

mod capture;
mod config;
mod queue;

pub use capture::capture;
pub use config::{config_init, config_show};
pub use queue::{queue_clear, queue_drain, queue_status};

use anyhow::Result;
use beacon_core::{Config, Paths};
use beacon_sdk::{StaticContext, Tracker, TrackerBuilder};
use beacon_store::{EventStore, JsonFileStore, SqliteStore};
use clap::ValueEnum;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Persistence backend for the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Json,
}

/// Paths, configuration and store choice shared by every command.
pub struct CliEnv {
    pub paths: Paths,
    pub config: Config,
    pub store: StoreKind,
}

impl CliEnv {
    pub fn load(base_dir: Option<PathBuf>, store: StoreKind) -> Result<Self> {
        let paths = match base_dir {
            Some(dir) => Paths::with_base_dir(dir),
            None => Paths::new()?,
        };
        paths.ensure_dirs()?;
        let config = Config::load(&paths)?;
        Ok(Self {
            paths,
            config,
            store,
        })
    }

    /// Where the snapshot lives, for display.
    pub fn store_location(&self) -> PathBuf {
        match self.store {
            StoreKind::Sqlite => self.paths.queue_database_file(),
            StoreKind::Json => JsonFileStore::new(&self.paths.queue_dir(), &self.config.storage_key)
                .path()
                .to_path_buf(),
        }
    }

    /// Open the configured store directly, without a tracker.
    pub fn open_store(&self) -> Result<Arc<dyn EventStore>> {
        let store: Arc<dyn EventStore> = match self.store {
            StoreKind::Sqlite => Arc::new(SqliteStore::open(
                &self.paths.queue_database_file(),
                &self.config.storage_key,
            )?),
            StoreKind::Json => Arc::new(JsonFileStore::new(
                &self.paths.queue_dir(),
                &self.config.storage_key,
            )),
        };
        Ok(store)
    }

    /// Tracker over the configured store, without the periodic timer.
    pub fn tracker(&self, distinct_id: Option<&str>) -> Result<Tracker> {
        let mut builder: TrackerBuilder = Tracker::builder(&self.config.api_key)
            .config(self.config.clone())
            .store(self.open_store()?)
            .context_provider(Arc::new(StaticContext::default().with("$source", "cli")))
            .autostart(false);
        if let Some(distinct_id) = distinct_id {
            builder = builder.distinct_id(distinct_id);
        }
        Ok(builder.build()?)
    }
}
