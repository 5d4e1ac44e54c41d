//! Synchronous SQLite snapshot store.

use crate::{migrations, EventStore, StoreResult};
use beacon_core::EventPayload;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, warn};

/// Pragmas applied to file-backed connections.
pub(crate) const FILE_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA busy_timeout = 5000;
";

/// Read the raw snapshot stored under `storage_key`.
pub(crate) fn read_snapshot(conn: &Connection, storage_key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT payload FROM queue_snapshots WHERE storage_key = ?1",
        params![storage_key],
        |row| row.get(0),
    )
    .optional()
}

/// Replace the snapshot under `storage_key`; `None` deletes it.
pub(crate) fn write_snapshot(
    conn: &Connection,
    storage_key: &str,
    payload: Option<(&str, usize)>,
) -> rusqlite::Result<()> {
    match payload {
        Some((json, count)) => {
            conn.execute(
                "INSERT INTO queue_snapshots (storage_key, payload, event_count, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(storage_key) DO UPDATE SET
                    payload = excluded.payload,
                    event_count = excluded.event_count,
                    updated_at = excluded.updated_at",
                params![storage_key, json, count as i64, Utc::now().to_rfc3339()],
            )?;
        }
        None => {
            conn.execute(
                "DELETE FROM queue_snapshots WHERE storage_key = ?1",
                params![storage_key],
            )?;
        }
    }
    Ok(())
}

/// Encode a snapshot for storage; empty lists encode to `None`.
pub(crate) fn encode(events: &[EventPayload]) -> StoreResult<Option<String>> {
    if events.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(events)?))
}

/// Decode a stored snapshot.
pub(crate) fn decode(raw: Option<String>) -> StoreResult<Vec<EventPayload>> {
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

/// Snapshot store over a single SQLite connection.
///
/// Several queues may share one database file by using distinct storage keys.
/// Each save is one small local transaction on the calling thread; use
/// [`crate::AsyncSqliteStore`] to keep writes off the async workers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    storage_key: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path, storage_key: &str) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(FILE_PRAGMAS)?;
        migrations::run_migrations(&conn)?;

        debug!(path = %path.display(), storage_key, "Opened SQLite queue store");
        Ok(Self {
            conn: Mutex::new(conn),
            storage_key: storage_key.to_string(),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory(storage_key: &str) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            storage_key: storage_key.to_string(),
        })
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Number of events in the stored snapshot, without decoding it.
    pub fn stored_count(&self) -> StoreResult<usize> {
        let count: Option<i64> = self
            .conn
            .lock()
            .query_row(
                "SELECT event_count FROM queue_snapshots WHERE storage_key = ?1",
                params![self.storage_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0) as usize)
    }

    fn try_save(&self, events: &[EventPayload]) -> StoreResult<()> {
        let json = encode(events)?;
        let conn = self.conn.lock();
        write_snapshot(
            &conn,
            &self.storage_key,
            json.as_deref().map(|json| (json, events.len())),
        )?;
        Ok(())
    }

    fn try_load(&self) -> StoreResult<Vec<EventPayload>> {
        let raw = read_snapshot(&self.conn.lock(), &self.storage_key)?;
        decode(raw)
    }
}

impl EventStore for SqliteStore {
    fn save(&self, events: &[EventPayload]) {
        if let Err(e) = self.try_save(events) {
            warn!(storage_key = %self.storage_key, error = %e, "Failed to save queue snapshot");
        }
    }

    fn load(&self) -> Vec<EventPayload> {
        self.try_load().unwrap_or_else(|e| {
            warn!(storage_key = %self.storage_key, error = %e, "Discarding unreadable queue snapshot");
            Vec::new()
        })
    }
}
