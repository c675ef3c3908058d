//! Error types for fintrack-sync.
//!
//! Remote failures (retryable or terminal) are not errors here: they are
//! recorded on the queued operation. This enum covers the structural
//! failures that must reach the caller.

use thiserror::Error;

use crate::features::sync::OperationStatus;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, FintrackError>;

/// Errors that can occur in fintrack-sync.
#[derive(Debug, Error)]
pub enum FintrackError {
    /// The queue cannot persist another operation.
    #[error("Storage full: {0}")]
    StorageFull(String),

    /// No operation with the given id exists in the active queue.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation's current status does not permit the requested change.
    #[error("Invalid transition for operation {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: OperationStatus,
        to: OperationStatus,
    },

    /// SQLite failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration could not be read, parsed, or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A queued payload cannot be turned into a request.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FintrackError {
    /// Create a not-found error for an operation id.
    pub fn not_found(id: impl AsRef<str>) -> Self {
        Self::NotFound(format!("operation {}", id.as_ref()))
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(
        id: impl Into<String>,
        from: OperationStatus,
        to: OperationStatus,
    ) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            from,
            to,
        }
    }

    /// Whether this is a queue-usage error (unknown id or bad transition)
    /// rather than a storage failure.
    #[must_use]
    pub const fn is_usage_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::InvalidTransition { .. })
    }
}

impl From<rusqlite::Error> for FintrackError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::DiskFull =>
            {
                Self::StorageFull(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}
