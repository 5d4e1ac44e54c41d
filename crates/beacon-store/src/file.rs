//! JSON file store: one file per storage key.

use crate::{EventStore, StoreResult};
use beacon_core::EventPayload;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Snapshot kept in `<dir>/<storage_key>.json`.
///
/// Writes go to a sibling temp file and are renamed into place, so a crash
/// mid-write leaves the previous snapshot intact.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: &Path, storage_key: &str) -> Self {
        Self {
            path: dir.join(format!("{storage_key}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_save(&self, events: &[EventPayload]) -> StoreResult<()> {
        if events.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(events)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn try_load(&self) -> StoreResult<Vec<EventPayload>> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl EventStore for JsonFileStore {
    fn save(&self, events: &[EventPayload]) {
        match self.try_save(events) {
            Ok(()) => debug!(path = %self.path.display(), count = events.len(), "Saved queue snapshot"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to save queue snapshot"),
        }
    }

    fn load(&self) -> Vec<EventPayload> {
        self.try_load().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Discarding unreadable queue snapshot");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn event(name: &str) -> EventPayload {
        EventPayload::builder(name, "user-1").build()
    }

    #[test]
    fn roundtrip_preserves_order() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), "beacon_queue");
        let events = vec![event("a"), event("b"), event("c")];

        store.save(&events);

        assert_eq!(store.load(), events);
        assert!(store.path().ends_with("beacon_queue.json"));
    }

    #[test]
    fn empty_save_removes_file() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), "q");

        store.save(&[event("a")]);
        assert!(store.path().exists());

        store.save(&[]);
        assert!(!store.path().exists());
        assert!(store.load().is_empty());

        // Clearing an already-absent snapshot is fine.
        store.save(&[]);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), "never-written");
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), "q");
        std::fs::write(store.path(), b"{not json").unwrap();

        assert!(store.load().is_empty());
    }

    #[test]
    fn keys_are_isolated() {
        let dir = tempdir().unwrap();
        let first = JsonFileStore::new(dir.path(), "first");
        let second = JsonFileStore::new(dir.path(), "second");

        first.save(&[event("a")]);

        assert_eq!(first.load().len(), 1);
        assert!(second.load().is_empty());
    }
}
