//! Schema migrations for the SQLite snapshot store.
//!
//! Applied versions are recorded in the `migrations` table.

use crate::StoreResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Snapshot schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_queue_snapshots(conn)?;
    }

    Ok(())
}

fn migrate_v1_queue_snapshots(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS queue_snapshots (
            storage_key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            event_count INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        INSERT INTO migrations (version, name) VALUES (1, 'queue_snapshots');
        ",
    )?;
    Ok(())
}
