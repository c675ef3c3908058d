//! `SQLite` database connection.
//!
//! The database is stored at `~/.fintrack/fintrack.db` and holds the active
//! sync queue plus the archive of applied operations.
//!
//! The connection sits behind a mutex so the queue can be shared between the
//! drain loop and callers enqueueing new work. Locks are held for a single
//! statement or transaction, never across an await point.

use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::Paths;
use crate::error::{FintrackError, Result};

use super::migrations;

/// Database connection wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at the default location.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open() -> Result<Self> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        Self::open_at(&paths.database)
    }

    /// Open the database at a specific path.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            FintrackError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;

        // committed transitions must survive power loss
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| FintrackError::Database(format!("Failed to configure database: {e}")))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            FintrackError::Database(format!("Failed to open in-memory database: {e}"))
        })?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| FintrackError::Database(format!("Failed to enable foreign keys: {e}")))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32> {
        migrations::get_version(&*self.lock()?)
    }

    /// Lock the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns an error if a previous holder panicked while holding the lock.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FintrackError::Database("Database connection lock is poisoned".to_string()))
    }
}
