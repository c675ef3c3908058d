//! Queued operation types.
//!
//! A `QueuedOperation` is one client-side mutation waiting to be replayed
//! against the remote API. The queue treats `target_entity` and `payload` as
//! opaque; only the executor interprets them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FintrackError, Result};

/// Kind of mutation being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a new record
    Create,
    /// Update an existing record
    Update,
    /// Delete a record
    Delete,
    /// Rename many records in one request (e.g. merge categories)
    BulkRename,
}

impl OperationKind {
    /// Get the display name for this kind.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::BulkRename => "Bulk Rename",
        }
    }

    /// Stable identifier used in storage and on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::BulkRename => "bulk_rename",
        }
    }

    /// Whether the remote request addresses a single existing record.
    #[must_use]
    pub const fn targets_record(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for OperationKind {
    type Err = FintrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "bulk_rename" => Ok(Self::BulkRename),
            other => Err(FintrackError::Config(format!(
                "Unknown operation kind: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a queued operation.
///
/// Allowed transitions: `Pending -> InFlight -> {Succeeded | Failed}` and
/// `Failed -> Pending` (retry). Nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting to be executed
    Pending,
    /// Currently being executed
    InFlight,
    /// Last attempt failed
    Failed,
    /// Applied remotely; archived out of the active queue
    Succeeded,
}

impl OperationStatus {
    /// Stable identifier used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
        }
    }

    /// Whether a status change from `self` to `next` is permitted.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Succeeded | Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }

    /// Whether the operation is still waiting for work (pending or failed).
    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = FintrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "in_flight" | "inflight" => Ok(Self::InFlight),
            "failed" => Ok(Self::Failed),
            "succeeded" => Ok(Self::Succeeded),
            other => Err(FintrackError::Config(format!("Unknown status: {other}"))),
        }
    }
}

/// Whether a failed operation may be retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient; the next pass retries it.
    Retryable,
    /// Cannot succeed as stored; needs manual retry or clear.
    Terminal,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Terminal => "terminal",
        }
    }
}

impl FromStr for FailureKind {
    type Err = FintrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "retryable" => Ok(Self::Retryable),
            "terminal" => Ok(Self::Terminal),
            other => Err(FintrackError::Database(format!(
                "Unknown failure kind: {other}"
            ))),
        }
    }
}

/// A recorded failure: classification plus the reason reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
}

impl Failure {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Retryable,
            reason: reason.into(),
        }
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Terminal,
            reason: reason.into(),
        }
    }
}

/// Request to enqueue a new operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    /// Caller-generated id; makes `enqueue` idempotent when set.
    pub id: Option<String>,
    pub kind: OperationKind,
    pub target_entity: String,
    /// Serialized request body
    pub payload: String,
}

impl NewOperation {
    /// Create a request from an already serialized payload.
    #[must_use]
    pub fn new(kind: OperationKind, target_entity: impl Into<String>, payload: String) -> Self {
        Self {
            id: None,
            kind,
            target_entity: target_entity.into(),
            payload,
        }
    }

    /// Create a request by serializing `body` to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn from_body<T: Serialize>(
        kind: OperationKind,
        target_entity: impl Into<String>,
        body: &T,
    ) -> Result<Self> {
        Ok(Self::new(kind, target_entity, serde_json::to_string(body)?))
    }

    /// Use a caller-supplied id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A queued operation with its sync metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    /// Unique id, stable for the operation's lifetime
    pub id: String,
    /// Global FIFO position
    pub seq: i64,
    pub kind: OperationKind,
    pub target_entity: String,
    /// Serialized request body
    pub payload: String,
    /// When the operation was queued
    pub created_at: DateTime<Utc>,
    pub status: OperationStatus,
    /// Number of execution attempts so far
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub failure_kind: Option<FailureKind>,
}

impl QueuedOperation {
    /// The remote record id, read from the payload's `"id"` field.
    #[must_use]
    pub fn record_id(&self) -> Option<String> {
        let value = serde_json::from_str::<serde_json::Value>(&self.payload).ok()?;
        match value.get("id")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Whether the last failure is terminal.
    #[must_use]
    pub fn is_terminal_failure(&self) -> bool {
        self.status == OperationStatus::Failed && self.failure_kind == Some(FailureKind::Terminal)
    }

    /// Whether an automatic pass may pick this operation up.
    ///
    /// `max_attempts` is the host-supplied ceiling; `None` means unlimited.
    #[must_use]
    pub fn eligible_for_automatic_retry(&self, max_attempts: Option<u32>) -> bool {
        match self.status {
            OperationStatus::Pending => true,
            OperationStatus::Failed => {
                !self.is_terminal_failure()
                    && max_attempts.map_or(true, |max| self.attempt_count < max)
            }
            OperationStatus::InFlight | OperationStatus::Succeeded => false,
        }
    }
}

/// A successfully applied operation, kept in the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedOperation {
    pub id: String,
    pub kind: OperationKind,
    pub target_entity: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub attempt_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(status: OperationStatus, failure_kind: Option<FailureKind>) -> QueuedOperation {
        QueuedOperation {
            id: "op-1".to_string(),
            seq: 1,
            kind: OperationKind::Update,
            target_entity: "transaction".to_string(),
            payload: r#"{"id":"tx-42","amount":"12.50"}"#.to_string(),
            created_at: Utc::now(),
            status,
            attempt_count: 2,
            last_attempt_at: None,
            last_error: None,
            failure_kind,
        }
    }

    #[test]
    fn test_status_transitions() {
        use OperationStatus::*;

        assert!(Pending.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(Succeeded));
        assert!(InFlight.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(InFlight));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Succeeded.can_transition_to(Pending));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("create".parse::<OperationKind>().unwrap(), OperationKind::Create);
        assert_eq!(
            "bulk-rename".parse::<OperationKind>().unwrap(),
            OperationKind::BulkRename
        );
        assert_eq!("DELETE".parse::<OperationKind>().unwrap(), OperationKind::Delete);
        assert!("upsert".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_status_round_trips_through_storage_name() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::InFlight,
            OperationStatus::Failed,
            OperationStatus::Succeeded,
        ] {
            assert_eq!(status.as_str().parse::<OperationStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_record_id_from_payload() {
        let op = queued(OperationStatus::Pending, None);
        assert_eq!(op.record_id(), Some("tx-42".to_string()));

        let mut numeric = op.clone();
        numeric.payload = r#"{"id":7}"#.to_string();
        assert_eq!(numeric.record_id(), Some("7".to_string()));

        let mut missing = op;
        missing.payload = r#"{"name":"Groceries"}"#.to_string();
        assert_eq!(missing.record_id(), None);
    }

    #[test]
    fn test_automatic_retry_eligibility() {
        assert!(queued(OperationStatus::Pending, None).eligible_for_automatic_retry(None));
        assert!(queued(OperationStatus::Failed, Some(FailureKind::Retryable))
            .eligible_for_automatic_retry(None));
        assert!(!queued(OperationStatus::Failed, Some(FailureKind::Terminal))
            .eligible_for_automatic_retry(None));

        // attempt_count is 2 in the fixture
        assert!(queued(OperationStatus::Failed, Some(FailureKind::Retryable))
            .eligible_for_automatic_retry(Some(3)));
        assert!(!queued(OperationStatus::Failed, Some(FailureKind::Retryable))
            .eligible_for_automatic_retry(Some(2)));
        // the ceiling never hides fresh work
        assert!(queued(OperationStatus::Pending, None).eligible_for_automatic_retry(Some(1)));
    }

    #[test]
    fn test_new_operation_from_body() {
        #[derive(Serialize)]
        struct Category<'a> {
            name: &'a str,
        }

        let op = NewOperation::from_body(
            OperationKind::Create,
            "category",
            &Category { name: "Rent" },
        )
        .unwrap()
        .with_id("client-1");

        assert_eq!(op.payload, r#"{"name":"Rent"}"#);
        assert_eq!(op.id.as_deref(), Some("client-1"));
        assert_eq!(op.target_entity, "category");
    }

    #[test]
    fn test_queued_operation_serializes_camel_case() {
        let json = serde_json::to_string(&queued(OperationStatus::Failed, None)).unwrap();
        assert!(json.contains("\"targetEntity\":\"transaction\""));
        assert!(json.contains("\"attemptCount\":2"));
        assert!(json.contains("\"status\":\"failed\""));
    }
}
