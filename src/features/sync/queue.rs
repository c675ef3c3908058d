//! Operation queue storage.
//!
//! `QueueStore` is the durable, ordered list of pending mutations. The
//! orchestrator only ever touches operations through this API; every call
//! that mutates state has committed to disk by the time it returns.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Error::FromSqlConversionFailure;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::operation::{ArchivedOperation, Failure, NewOperation, OperationStatus, QueuedOperation};
use crate::error::{FintrackError, Result};
use crate::storage::Database;

/// Default capacity of the active queue.
pub const DEFAULT_MAX_OPERATIONS: usize = 10_000;

/// Aggregate view of the active queue, recomputed on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// All operations in the active queue
    pub total_operations: u64,
    /// Waiting or currently executing
    pub pending_operations: u64,
    /// Last attempt failed (retryable or terminal)
    pub failed_operations: u64,
    /// Subset of `pending_operations` currently executing
    pub in_flight_operations: u64,
    /// Subset of `failed_operations` that will not be retried automatically
    pub terminal_failed_operations: u64,
    /// Creation time of the oldest operation still waiting
    pub oldest_pending_at: Option<DateTime<Utc>>,
}

impl QueueSnapshot {
    /// Whether the host should offer retry/clear actions.
    #[must_use]
    pub const fn needs_attention(&self) -> bool {
        self.failed_operations > 0
    }
}

/// Durable, ordered storage of queued operations.
pub trait QueueStore: Send + Sync {
    /// Append a new pending operation and return its id.
    ///
    /// With a caller-supplied id that is already known (queued or archived)
    /// this is a no-op returning that id. Otherwise every call creates a new
    /// entry, even for duplicate payloads.
    fn enqueue(&self, operation: NewOperation) -> Result<String>;

    /// Pending and failed operations in creation order.
    fn list_pending(&self) -> Result<Vec<QueuedOperation>>;

    /// Operations with the given status in creation order.
    fn list_by_status(&self, status: OperationStatus) -> Result<Vec<QueuedOperation>>;

    /// Look up an operation in the active queue.
    fn get(&self, id: &str) -> Result<Option<QueuedOperation>>;

    /// `Pending -> InFlight`; counts one execution attempt.
    fn mark_in_flight(&self, id: &str) -> Result<()>;

    /// `InFlight -> Succeeded`; moves the operation to the archive.
    fn mark_succeeded(&self, id: &str) -> Result<()>;

    /// `InFlight -> Failed`, recording the failure.
    fn mark_failed(&self, id: &str, failure: &Failure) -> Result<()>;

    /// `Failed -> Pending` for a retry.
    fn requeue(&self, id: &str) -> Result<()>;

    /// Remove every failed operation. Returns how many were removed.
    fn clear_failed(&self) -> Result<usize>;

    /// Reset operations left in flight by a crash back to pending.
    fn recover_in_flight(&self) -> Result<usize>;

    /// Aggregate counts for status readouts.
    fn snapshot(&self) -> Result<QueueSnapshot>;

    /// Most recently applied operations, newest first.
    fn history(&self, limit: usize) -> Result<Vec<ArchivedOperation>>;

    /// Drop archived operations completed before `cutoff`.
    fn prune_history(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// `SQLite`-backed queue.
pub struct SqliteQueue {
    db: Database,
    max_operations: usize,
}

const QUEUE_COLUMNS: &str = "id, seq, kind, target_entity, payload, created_at, status,
     attempt_count, last_attempt_at, last_error, failure_kind";

impl SqliteQueue {
    /// Open the queue at the default database location.
    ///
    /// Operations left in flight by a previous process are reset to pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open() -> Result<Self> {
        Self::with_database(Database::open()?)
    }

    /// Create a queue on an existing database.
    ///
    /// Operations left in flight by a previous process are reset to pending.
    ///
    /// # Errors
    ///
    /// Returns an error if crash recovery fails.
    pub fn with_database(db: Database) -> Result<Self> {
        let queue = Self {
            db,
            max_operations: DEFAULT_MAX_OPERATIONS,
        };
        let recovered = queue.recover_in_flight()?;
        if recovered > 0 {
            info!(recovered, "reset interrupted operations to pending");
        }
        Ok(queue)
    }

    /// Limit the number of operations the active queue may hold.
    #[must_use]
    pub const fn with_capacity(mut self, max_operations: usize) -> Self {
        self.max_operations = max_operations;
        self
    }

    fn query_operations<P: rusqlite::Params>(
        conn: &Connection,
        filter: &str,
        args: P,
    ) -> Result<Vec<QueuedOperation>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE {filter} ORDER BY seq ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args, row_to_operation)?;

        let mut operations = Vec::new();
        for row in rows {
            operations.push(row?);
        }
        Ok(operations)
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<QueuedOperation>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], row_to_operation).optional()?)
    }

    fn is_archived(conn: &Connection, id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM sync_history WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Load an operation and check that it may move to `next`.
    fn load_for_transition(
        conn: &Connection,
        id: &str,
        next: OperationStatus,
    ) -> Result<QueuedOperation> {
        let Some(operation) = Self::load(conn, id)? else {
            if Self::is_archived(conn, id)? {
                return Err(FintrackError::invalid_transition(
                    id,
                    OperationStatus::Succeeded,
                    next,
                ));
            }
            return Err(FintrackError::not_found(id));
        };

        if !operation.status.can_transition_to(next) {
            return Err(FintrackError::invalid_transition(id, operation.status, next));
        }
        Ok(operation)
    }
}

impl QueueStore for SqliteQueue {
    fn enqueue(&self, operation: NewOperation) -> Result<String> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        if let Some(id) = operation.id.as_deref() {
            if Self::load(&tx, id)?.is_some() || Self::is_archived(&tx, id)? {
                debug!(id, "enqueue with known id is a no-op");
                return Ok(id.to_string());
            }
        }

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        if usize::try_from(count).unwrap_or(usize::MAX) >= self.max_operations {
            return Err(FintrackError::StorageFull(format!(
                "queue holds {count} operations (limit {})",
                self.max_operations
            )));
        }

        let id = operation
            .id
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        tx.execute(
            r"INSERT INTO sync_queue (id, kind, target_entity, payload, created_at, status)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                operation.kind.as_str(),
                operation.target_entity,
                operation.payload,
                Utc::now().to_rfc3339(),
                OperationStatus::Pending.as_str(),
            ],
        )?;
        tx.commit()?;

        debug!(id, kind = %operation.kind, entity = %operation.target_entity, "enqueued operation");
        Ok(id)
    }

    fn list_pending(&self) -> Result<Vec<QueuedOperation>> {
        let conn = self.db.lock()?;
        Self::query_operations(
            &conn,
            "status IN (?1, ?2)",
            params![
                OperationStatus::Pending.as_str(),
                OperationStatus::Failed.as_str(),
            ],
        )
    }

    fn list_by_status(&self, status: OperationStatus) -> Result<Vec<QueuedOperation>> {
        let conn = self.db.lock()?;
        Self::query_operations(&conn, "status = ?1", [status.as_str()])
    }

    fn get(&self, id: &str) -> Result<Option<QueuedOperation>> {
        let conn = self.db.lock()?;
        Self::load(&conn, id)
    }

    fn mark_in_flight(&self, id: &str) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        Self::load_for_transition(&tx, id, OperationStatus::InFlight)?;

        tx.execute(
            r"UPDATE sync_queue SET
              status = ?1,
              attempt_count = attempt_count + 1,
              last_attempt_at = ?2
              WHERE id = ?3",
            params![OperationStatus::InFlight.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_succeeded(&self, id: &str) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let operation = Self::load_for_transition(&tx, id, OperationStatus::Succeeded)?;

        tx.execute(
            r"INSERT INTO sync_history (id, kind, target_entity, created_at, completed_at, attempt_count)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                operation.id,
                operation.kind.as_str(),
                operation.target_entity,
                operation.created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                operation.attempt_count,
            ],
        )?;
        tx.execute("DELETE FROM sync_queue WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    fn mark_failed(&self, id: &str, failure: &Failure) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        Self::load_for_transition(&tx, id, OperationStatus::Failed)?;

        tx.execute(
            r"UPDATE sync_queue SET
              status = ?1,
              last_error = ?2,
              failure_kind = ?3
              WHERE id = ?4",
            params![
                OperationStatus::Failed.as_str(),
                failure.reason,
                failure.kind.as_str(),
                id,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn requeue(&self, id: &str) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        Self::load_for_transition(&tx, id, OperationStatus::Pending)?;

        // last_error stays for diagnostics until the next attempt resolves it
        tx.execute(
            "UPDATE sync_queue SET status = ?1, failure_kind = NULL WHERE id = ?2",
            params![OperationStatus::Pending.as_str(), id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn clear_failed(&self) -> Result<usize> {
        let conn = self.db.lock()?;
        let removed = conn.execute(
            "DELETE FROM sync_queue WHERE status = ?1",
            [OperationStatus::Failed.as_str()],
        )?;
        Ok(removed)
    }

    fn recover_in_flight(&self) -> Result<usize> {
        let conn = self.db.lock()?;
        let recovered = conn.execute(
            "UPDATE sync_queue SET status = ?1 WHERE status = ?2",
            [
                OperationStatus::Pending.as_str(),
                OperationStatus::InFlight.as_str(),
            ],
        )?;
        Ok(recovered)
    }

    fn snapshot(&self) -> Result<QueueSnapshot> {
        let conn = self.db.lock()?;

        let (total, pending, failed, in_flight, terminal): (i64, i64, i64, i64, i64) = conn
            .query_row(
                r"SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN status IN ('pending', 'in_flight') THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'in_flight' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'failed' AND failure_kind = 'terminal' THEN 1 ELSE 0 END), 0)
                  FROM sync_queue",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?;

        let oldest_pending: Option<String> = conn
            .query_row(
                "SELECT created_at FROM sync_queue WHERE status IN ('pending', 'failed') ORDER BY seq ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(QueueSnapshot {
            total_operations: count(total),
            pending_operations: count(pending),
            failed_operations: count(failed),
            in_flight_operations: count(in_flight),
            terminal_failed_operations: count(terminal),
            oldest_pending_at: oldest_pending.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    fn history(&self, limit: usize) -> Result<Vec<ArchivedOperation>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            r"SELECT id, kind, target_entity, created_at, completed_at, attempt_count
              FROM sync_history
              ORDER BY completed_at DESC
              LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map([limit], row_to_archived)?;

        let mut archived = Vec::new();
        for row in rows {
            archived.push(row?);
        }
        Ok(archived)
    }

    fn prune_history(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.db.lock()?;
        let removed = conn.execute(
            "DELETE FROM sync_history WHERE completed_at < ?1",
            [cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FintrackError::Database(format!("Invalid timestamp '{value}': {e}")))
}

/// Map a domain parse failure onto rusqlite's conversion error for column `idx`.
fn column<T>(idx: usize, value: Result<T>) -> rusqlite::Result<T> {
    value.map_err(|e| FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value
        .as_deref()
        .map(|v| column(idx, parse_timestamp(v)))
        .transpose()
}

fn row_to_operation(row: &Row<'_>) -> rusqlite::Result<QueuedOperation> {
    let kind: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let status: String = row.get(6)?;
    let failure_kind: Option<String> = row.get(10)?;

    Ok(QueuedOperation {
        id: row.get(0)?,
        seq: row.get(1)?,
        kind: column(2, kind.parse())?,
        target_entity: row.get(3)?,
        payload: row.get(4)?,
        created_at: column(5, parse_timestamp(&created_at))?,
        status: column(6, status.parse())?,
        attempt_count: row.get(7)?,
        last_attempt_at: optional_timestamp(8, row.get(8)?)?,
        last_error: row.get(9)?,
        failure_kind: failure_kind
            .as_deref()
            .map(|v| column(10, v.parse()))
            .transpose()?,
    })
}

fn row_to_archived(row: &Row<'_>) -> rusqlite::Result<ArchivedOperation> {
    let kind: String = row.get(1)?;
    let created_at: String = row.get(3)?;
    let completed_at: String = row.get(4)?;

    Ok(ArchivedOperation {
        id: row.get(0)?,
        kind: column(1, kind.parse())?,
        target_entity: row.get(2)?,
        created_at: column(3, parse_timestamp(&created_at))?,
        completed_at: column(4, parse_timestamp(&completed_at))?,
        attempt_count: row.get(5)?,
    })
}
