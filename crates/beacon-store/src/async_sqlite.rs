//! Asynchronous SQLite snapshot store.
//!
//! All SQL runs on the dedicated `tokio-rusqlite` executor thread; JSON
//! encoding and decoding stay on the caller's task.

use crate::sqlite::{decode, encode, read_snapshot, write_snapshot, FILE_PRAGMAS};
use crate::{migrations, AsyncEventStore, StoreError, StoreResult};
use async_trait::async_trait;
use beacon_core::EventPayload;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => StoreError::Connection("Connection closed".to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

/// Snapshot store backed by an async SQLite executor.
#[derive(Clone)]
pub struct AsyncSqliteStore {
    conn: Connection,
    storage_key: String,
}

impl AsyncSqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path, storage_key: &str) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(FILE_PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        Self::migrate(&conn).await?;

        info!(path = %path.display(), storage_key, "Opened async SQLite queue store");
        Ok(Self {
            conn,
            storage_key: storage_key.to_string(),
        })
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory(storage_key: &str) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Self::migrate(&conn).await?;
        Ok(Self {
            conn,
            storage_key: storage_key.to_string(),
        })
    }

    async fn migrate(conn: &Connection) -> StoreResult<()> {
        conn.call(|conn| {
            migrations::run_migrations(conn)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    async fn try_save(&self, events: Vec<EventPayload>) -> StoreResult<()> {
        let count = events.len();
        let json = encode(&events)?;
        let key = self.storage_key.clone();

        self.conn
            .call(move |conn| {
                write_snapshot(conn, &key, json.as_deref().map(|json| (json, count)))?;
                Ok(())
            })
            .await
            .map_err(from_tokio_rusqlite)
    }

    async fn try_load(&self) -> StoreResult<Vec<EventPayload>> {
        let key = self.storage_key.clone();
        let raw = self
            .conn
            .call(move |conn| Ok(read_snapshot(conn, &key)?))
            .await
            .map_err(from_tokio_rusqlite)?;
        decode(raw)
    }
}

#[async_trait]
impl AsyncEventStore for AsyncSqliteStore {
    async fn save(&self, events: Vec<EventPayload>) {
        let count = events.len();
        match self.try_save(events).await {
            Ok(()) => debug!(storage_key = %self.storage_key, count, "Saved queue snapshot"),
            Err(e) => warn!(storage_key = %self.storage_key, error = %e, "Failed to save queue snapshot"),
        }
    }

    async fn load(&self) -> Vec<EventPayload> {
        match self.try_load().await {
            Ok(events) => events,
            Err(e) => {
                warn!(storage_key = %self.storage_key, error = %e, "Discarding unreadable queue snapshot");
                Vec::new()
            }
        }
    }
}
