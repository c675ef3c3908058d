//! Output formatting for fintrack-sync.
//!
//! Every command renders either colored text or pretty-printed JSON.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::FintrackError;
use crate::features::sync::{
    ArchivedOperation, PassReport, QueueSnapshot, QueuedOperation, RetryReport,
};

pub use json::*;
pub use pretty::*;

/// Format queue counts based on output format
///
/// # Errors
///
/// Returns `FintrackError::Json` if JSON serialization fails.
pub fn format_snapshot(
    snapshot: &QueueSnapshot,
    format: OutputFormat,
) -> Result<String, FintrackError> {
    match format {
        OutputFormat::Pretty => Ok(format_snapshot_pretty(snapshot)),
        OutputFormat::Json => to_json(snapshot),
    }
}

/// Format queued operations based on output format
///
/// # Errors
///
/// Returns `FintrackError::Json` if JSON serialization fails.
pub fn format_operations(
    operations: &[QueuedOperation],
    title: &str,
    format: OutputFormat,
) -> Result<String, FintrackError> {
    match format {
        OutputFormat::Pretty => Ok(format_operations_pretty(operations, title)),
        OutputFormat::Json => format_operations_json(operations, title),
    }
}

/// Format applied operations based on output format
///
/// # Errors
///
/// Returns `FintrackError::Json` if JSON serialization fails.
pub fn format_history(
    history: &[ArchivedOperation],
    format: OutputFormat,
) -> Result<String, FintrackError> {
    match format {
        OutputFormat::Pretty => Ok(format_history_pretty(history)),
        OutputFormat::Json => format_history_json(history),
    }
}

/// Format a drain pass result based on output format
///
/// # Errors
///
/// Returns `FintrackError::Json` if JSON serialization fails.
pub fn format_pass(report: &PassReport, format: OutputFormat) -> Result<String, FintrackError> {
    match format {
        OutputFormat::Pretty => Ok(format_pass_pretty(report)),
        OutputFormat::Json => to_json(report),
    }
}

/// Format a manual retry result based on output format
///
/// # Errors
///
/// Returns `FintrackError::Json` if JSON serialization fails.
pub fn format_retry(report: &RetryReport, format: OutputFormat) -> Result<String, FintrackError> {
    match format {
        OutputFormat::Pretty => Ok(format_retry_pretty(report)),
        OutputFormat::Json => to_json(report),
    }
}
