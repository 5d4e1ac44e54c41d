//! File system paths used by the SDK and CLI.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".beacon";

/// Resolves every on-disk location from one base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `~/.beacon`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Paths rooted at a custom directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// `~/.beacon/config.json`
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// `~/.beacon/queue.sqlite`, the SQLite queue snapshot store.
    pub fn queue_database_file(&self) -> PathBuf {
        self.base_dir.join("queue.sqlite")
    }

    /// `~/.beacon/queue`, one JSON file per storage key.
    pub fn queue_dir(&self) -> PathBuf {
        self.base_dir.join("queue")
    }

    /// `~/.beacon/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// `~/.beacon/logs/beacon.jsonl`
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("beacon.jsonl")
    }

    /// Create the base, queue and log directories.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.queue_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
