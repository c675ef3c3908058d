//! Database migrations for fintrack-sync.
//!
//! Each migration is a function that upgrades the schema by one version.
//! Migrations are run automatically when the database is opened.

use rusqlite::Connection;

use crate::error::{FintrackError, Result};

/// Current schema version.
const CURRENT_VERSION: i32 = 2;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| FintrackError::Database(format!("Failed to get schema version: {e}")))
}

fn set_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| FintrackError::Database(format!("Failed to set schema version: {e}")))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<()> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(conn, version)?;
        set_version(conn, version)?;
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(FintrackError::Database(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: active operation queue.
///
/// `seq` gives the global FIFO order; `id` is the externally visible key.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS sync_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            target_entity TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT,
            last_error TEXT,
            failure_kind TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_queue_status
        ON sync_queue(status);
        ",
    )
    .map_err(|e| FintrackError::Database(format!("Migration v1 failed: {e}")))
}

/// Migration v2: archive of applied operations.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS sync_history (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            target_entity TEXT NOT NULL,
            created_at TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            attempt_count INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sync_history_completed
        ON sync_history(completed_at);
        ",
    )
    .map_err(|e| FintrackError::Database(format!("Migration v2 failed: {e}")))
}
