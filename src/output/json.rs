//! JSON output formatting for fintrack-sync.

use serde::Serialize;
use serde_json::json;

use crate::error::FintrackError;
use crate::features::sync::{ArchivedOperation, QueuedOperation};

/// Format queued operations as JSON
///
/// # Errors
///
/// Returns `FintrackError::Json` if serialization fails.
pub fn format_operations_json(
    operations: &[QueuedOperation],
    title: &str,
) -> Result<String, FintrackError> {
    let output = json!({
        "list": title,
        "count": operations.len(),
        "items": operations
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format archived operations as JSON
///
/// # Errors
///
/// Returns `FintrackError::Json` if serialization fails.
pub fn format_history_json(history: &[ArchivedOperation]) -> Result<String, FintrackError> {
    let output = json!({
        "count": history.len(),
        "items": history
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Serialize any value as pretty JSON
///
/// # Errors
///
/// Returns `FintrackError::Json` if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, FintrackError> {
    Ok(serde_json::to_string_pretty(value)?)
}
