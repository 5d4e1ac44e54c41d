//! Queue inspection and draining.

use super::{CliEnv, StoreKind};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use beacon_sdk::QueueStats;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Serialize)]
struct QueueStatus {
    store: StoreKind,
    location: PathBuf,
    storage_key: String,
    pending: usize,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", output::row("Store", format!("{:?}", self.store).to_lowercase()))?;
        writeln!(f, "{}", output::row("Location", self.location.display()))?;
        writeln!(f, "{}", output::row("Storage key", &self.storage_key))?;
        write!(f, "{}", output::row("Pending", self.pending))
    }
}

#[derive(Debug, Serialize)]
struct DrainReport {
    drained: bool,
    remaining: usize,
    stats: QueueStats,
}

impl fmt::Display for DrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.remaining == 0 {
            write!(f, "Queue drained")
        } else if self.stats.halted {
            write!(f, "Event quota exhausted; queued events were discarded")
        } else {
            write!(
                f,
                "{} event(s) still queued (consecutive failures: {})",
                self.remaining, self.stats.consecutive_failures
            )
        }
    }
}

#[derive(Debug, Serialize)]
struct ClearReport {
    cleared: usize,
}

impl fmt::Display for ClearReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cleared {} queued event(s)", self.cleared)
    }
}

/// Show how many events are persisted.
pub fn queue_status(env: &CliEnv, format: &OutputFormat) -> Result<()> {
    let store = env.open_store()?;

    output::print(
        &QueueStatus {
            store: env.store,
            location: env.store_location(),
            storage_key: env.config.storage_key.clone(),
            pending: store.load().len(),
        },
        format,
    );
    Ok(())
}

/// Restore the persisted queue and deliver it.
pub async fn queue_drain(env: &CliEnv, timeout_ms: u64, format: &OutputFormat) -> Result<()> {
    let tracker = env.tracker(None)?;
    let before = tracker.queue_size();
    let drained = tracker.shutdown(Duration::from_millis(timeout_ms)).await;
    let remaining = tracker.queue_size();

    info!(before, remaining, drained, "Queue drain finished");

    output::print(
        &DrainReport {
            drained,
            remaining,
            stats: tracker.stats(),
        },
        format,
    );
    Ok(())
}

/// Discard the persisted queue.
pub fn queue_clear(env: &CliEnv, format: &OutputFormat) -> Result<()> {
    let store = env.open_store()?;
    let cleared = store.load().len();
    store.save(&[]);

    info!(cleared, "Queue cleared");
    output::print(&ClearReport { cleared }, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{Config, EventPayload, Paths};
    use tempfile::tempdir;

    fn env(dir: &std::path::Path, store: StoreKind) -> CliEnv {
        let paths = Paths::with_base_dir(dir.to_path_buf());
        paths.ensure_dirs().unwrap();
        CliEnv {
            paths,
            config: Config {
                api_key: "phc_test".to_string(),
                ..Config::default()
            },
            store,
        }
    }

    #[test]
    fn clear_empties_each_store_kind() {
        for kind in [StoreKind::Sqlite, StoreKind::Json] {
            let dir = tempdir().unwrap();
            let env = env(dir.path(), kind);
            let store = env.open_store().unwrap();
            store.save(&[EventPayload::builder("a", "u").build()]);

            queue_clear(&env, &OutputFormat::Json).unwrap();

            assert!(env.open_store().unwrap().load().is_empty());
        }
    }

    #[test]
    fn status_reports_location() {
        let dir = tempdir().unwrap();
        let env = env(dir.path(), StoreKind::Json);

        assert!(env.store_location().ends_with("queue/beacon_queue.json"));
        queue_status(&env, &OutputFormat::Text).unwrap();
    }
}
