//! Queue management commands.
//!
//! These only touch the local queue database; none of them call the API.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::json;

use crate::cli::args::OutputFormat;
use crate::error::FintrackError;
use crate::features::sync::{NewOperation, OperationKind, OperationStatus, QueueStore};
use crate::output::{format_history, format_operations, format_snapshot, to_json};

/// Queue a mutation.
///
/// # Errors
///
/// Returns `InvalidPayload` if `payload` is not JSON or an update/delete
/// payload has no `"id"`, or `StorageFull` if the queue is at capacity.
pub fn enqueue(
    queue: &dyn QueueStore,
    kind: OperationKind,
    entity: &str,
    payload: &str,
    id: Option<String>,
    format: OutputFormat,
) -> Result<String, FintrackError> {
    let body: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| FintrackError::InvalidPayload(format!("payload is not valid JSON: {e}")))?;
    if kind.targets_record() && !matches!(body.get("id"), Some(v) if v.is_string() || v.is_number())
    {
        return Err(FintrackError::InvalidPayload(format!(
            "{} requires an \"id\" field in the payload",
            kind.as_str()
        )));
    }

    let mut operation = NewOperation::from_body(kind, entity, &body)?;
    if let Some(id) = id {
        operation = operation.with_id(id);
    }
    let id = queue.enqueue(operation)?;

    match format {
        OutputFormat::Json => to_json(&json!({
            "id": id,
            "kind": kind,
            "targetEntity": entity,
        })),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} {} (ID: {})",
            kind.display_name(),
            entity,
            id
        )),
    }
}

/// Show queue counts.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn status(queue: &dyn QueueStore, format: OutputFormat) -> Result<String, FintrackError> {
    let snapshot = queue.snapshot()?;
    format_snapshot(&snapshot, format)
}

/// List queued operations.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn list(
    queue: &dyn QueueStore,
    status: Option<OperationStatus>,
    limit: usize,
    format: OutputFormat,
) -> Result<String, FintrackError> {
    let (title, mut operations) = match status {
        Some(status) => (
            format!("{} Operations", status.as_str().to_uppercase()),
            queue.list_by_status(status)?,
        ),
        None => ("Sync Queue".to_string(), queue.list_pending()?),
    };
    operations.truncate(limit);

    format_operations(&operations, &title, format)
}

/// Show recently applied operations.
///
/// # Errors
///
/// Returns an error if the history cannot be read.
pub fn history(
    queue: &dyn QueueStore,
    limit: usize,
    format: OutputFormat,
) -> Result<String, FintrackError> {
    let history = queue.history(limit)?;
    format_history(&history, format)
}

/// Drop history entries older than `days`.
///
/// # Errors
///
/// Returns an error if the history cannot be updated.
pub fn prune_history(
    queue: &dyn QueueStore,
    days: u32,
    format: OutputFormat,
) -> Result<String, FintrackError> {
    // beyond chrono's range nothing can be that old
    let cutoff = chrono::Duration::try_days(i64::from(days))
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let removed = queue.prune_history(cutoff)?;

    match format {
        OutputFormat::Json => to_json(&json!({ "pruned": removed })),
        OutputFormat::Pretty => Ok(format!(
            "Pruned {removed} history entries older than {days} days"
        )),
    }
}

/// Put one failed operation back to pending.
///
/// # Errors
///
/// Returns `NotFound` or `InvalidTransition` if the operation is unknown
/// or not failed.
pub fn requeue(
    queue: &dyn QueueStore,
    id: &str,
    format: OutputFormat,
) -> Result<String, FintrackError> {
    queue.requeue(id)?;

    match format {
        OutputFormat::Json => to_json(&json!({ "requeued": id })),
        OutputFormat::Pretty => Ok(format!(
            "Operation {id} will be retried on the next drain"
        )),
    }
}

/// Remove failed operations.
///
/// # Errors
///
/// Returns a config error without `force`, or an error if the queue cannot
/// be updated.
pub fn clear_failed(
    queue: &dyn QueueStore,
    force: bool,
    format: OutputFormat,
) -> Result<String, FintrackError> {
    if !force {
        return Err(FintrackError::Config(
            "Use --force to remove failed operations".to_string(),
        ));
    }

    let removed = queue.clear_failed()?;

    match format {
        OutputFormat::Json => to_json(&json!({ "cleared": removed })),
        OutputFormat::Pretty if removed == 0 => Ok("No failed operations to clear.".to_string()),
        OutputFormat::Pretty => Ok(format!(
            "{} Cleared {removed} failed operations",
            "✓".green()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sync::{Failure, SqliteQueue};
    use crate::storage::Database;

    fn queue() -> SqliteQueue {
        SqliteQueue::with_database(Database::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_enqueue_rejects_invalid_json() {
        let queue = queue();
        let err = enqueue(
            &queue,
            OperationKind::Create,
            "transaction",
            "{amount: 5",
            None,
            OutputFormat::Pretty,
        )
        .unwrap_err();

        assert!(matches!(err, FintrackError::InvalidPayload(_)));
        assert_eq!(queue.snapshot().unwrap().total_operations, 0);
    }

    #[test]
    fn test_enqueue_update_requires_record_id() {
        let queue = queue();
        let err = enqueue(
            &queue,
            OperationKind::Update,
            "transaction",
            r#"{"amount":"1.00"}"#,
            None,
            OutputFormat::Pretty,
        )
        .unwrap_err();

        assert!(matches!(err, FintrackError::InvalidPayload(_)));
    }

    #[test]
    fn test_enqueue_json_output() {
        let queue = queue();
        let output = enqueue(
            &queue,
            OperationKind::Delete,
            "category",
            r#"{"id":"c1"}"#,
            Some("k-1".to_string()),
            OutputFormat::Json,
        )
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["id"], "k-1");
        assert_eq!(parsed["kind"], "delete");
    }

    #[test]
    fn test_clear_failed_requires_force() {
        let queue = queue();
        assert!(clear_failed(&queue, false, OutputFormat::Pretty).is_err());

        let id = queue
            .enqueue(NewOperation::new(OperationKind::Create, "transaction", "{}".into()))
            .unwrap();
        queue.mark_in_flight(&id).unwrap();
        queue.mark_failed(&id, &Failure::retryable("HTTP 500")).unwrap();

        let output = clear_failed(&queue, true, OutputFormat::Json).unwrap();
        assert!(output.contains("\"cleared\": 1"));
        let output = clear_failed(&queue, true, OutputFormat::Pretty).unwrap();
        assert_eq!(output, "No failed operations to clear.");
    }

    #[test]
    fn test_prune_history_with_huge_age_prunes_nothing() {
        let queue = queue();
        let id = queue
            .enqueue(NewOperation::new(OperationKind::Create, "transaction", "{}".into()))
            .unwrap();
        queue.mark_in_flight(&id).unwrap();
        queue.mark_succeeded(&id).unwrap();

        let output = prune_history(&queue, 100_000_000, OutputFormat::Json).unwrap();
        assert!(output.contains("\"pruned\": 0"));
        let output = prune_history(&queue, u32::MAX, OutputFormat::Json).unwrap();
        assert!(output.contains("\"pruned\": 0"));
        assert_eq!(queue.history(10).unwrap().len(), 1);

        // a zero age cuts off at now, so everything already applied goes
        std::thread::sleep(std::time::Duration::from_millis(5));
        let output = prune_history(&queue, 0, OutputFormat::Json).unwrap();
        assert!(output.contains("\"pruned\": 1"));
    }

    #[test]
    fn test_list_respects_limit() {
        let queue = queue();
        for _ in 0..5 {
            queue
                .enqueue(NewOperation::new(OperationKind::Create, "transaction", "{}".into()))
                .unwrap();
        }

        let output = list(&queue, None, 2, OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["count"], 2);
    }
}
