use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::features::sync::{
    ArchivedOperation, HealthReport, HealthStatus, OperationStatus, PassReport, QueueSnapshot,
    QueuedOperation, RetryReport,
};

const MAX_ERROR_WIDTH: usize = 60;

/// Human-readable age of a timestamp ("3 hours ago").
fn age(since: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(since);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Format queue counts
pub fn format_snapshot_pretty(snapshot: &QueueSnapshot) -> String {
    let mut lines = Vec::new();

    lines.push("Sync Queue Status".bold().to_string());
    lines.push("─".repeat(40));

    lines.push(format!("  Total:      {}", snapshot.total_operations));
    lines.push(format!(
        "  Pending:    {} {}",
        snapshot.pending_operations,
        if snapshot.in_flight_operations > 0 {
            format!("({} in flight)", snapshot.in_flight_operations).dimmed()
        } else if snapshot.pending_operations > 0 {
            "waiting to sync".dimmed()
        } else {
            "".dimmed()
        }
    ));
    lines.push(format!(
        "  Failed:     {} {}",
        snapshot.failed_operations,
        if snapshot.terminal_failed_operations > 0 {
            format!("({} need your action)", snapshot.terminal_failed_operations).red()
        } else if snapshot.failed_operations > 0 {
            "will retry".yellow()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = snapshot.oldest_pending_at {
        lines.push(format!("  Oldest:     {}", age(oldest).dimmed()));
    }

    if snapshot.needs_attention() {
        lines.push(String::new());
        lines.push(
            "Run 'fintrack-sync retry' to replay failed operations or 'fintrack-sync clear-failed --force' to drop them"
                .dimmed()
                .to_string(),
        );
    } else if snapshot.pending_operations > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'fintrack-sync drain' to sync pending operations"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format queued operations as a table
pub fn format_operations_pretty(operations: &[QueuedOperation], title: &str) -> String {
    if operations.is_empty() {
        return format!("{title} (0 operations)\n  Queue is empty");
    }

    let mut lines = Vec::new();
    lines.push(format!("{title} ({} operations)", operations.len()));
    lines.push("─".repeat(72));
    lines.push(format!(
        "{:<38} {:<12} {:<14} {:<8} {}",
        "ID", "Kind", "Entity", "Tries", "Status"
    ));
    lines.push("─".repeat(72));

    for op in operations {
        let status = match op.status {
            OperationStatus::Pending => "pending".normal(),
            OperationStatus::InFlight => "in flight".cyan(),
            OperationStatus::Failed if op.is_terminal_failure() => "rejected".red(),
            OperationStatus::Failed => "failed".yellow(),
            OperationStatus::Succeeded => "done".green(),
        };

        lines.push(format!(
            "{:<38} {:<12} {:<14} {:<8} {}",
            op.id,
            op.kind.display_name(),
            truncate(&op.target_entity, 14),
            op.attempt_count,
            status
        ));

        if let Some(error) = &op.last_error {
            lines.push(format!("  {}", truncate(error, MAX_ERROR_WIDTH).red()));
        }
    }

    lines.join("\n")
}

/// Format applied operations
pub fn format_history_pretty(history: &[ArchivedOperation]) -> String {
    if history.is_empty() {
        return "No operations applied yet.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!("Recently Applied ({})", history.len()));
    lines.push("─".repeat(60));

    for op in history {
        lines.push(format!(
            "{} {} {} {}",
            "✓".green(),
            op.kind.display_name().bold(),
            op.target_entity,
            format!(
                "{} ({} tries)",
                op.completed_at.format("%Y-%m-%d %H:%M"),
                op.attempt_count
            )
            .dimmed()
        ));
    }

    lines.join("\n")
}

/// Format the result of a drain pass
pub fn format_pass_pretty(report: &PassReport) -> String {
    if report.attempted == 0 && report.skipped == 0 {
        return "No pending operations to sync.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!("Sync Results ({})", report.source).bold().to_string());
    lines.push("─".repeat(40));

    lines.push(format!("  {} {} succeeded", "✓".green(), report.succeeded));
    if report.retryable_failures > 0 {
        lines.push(format!(
            "  {} {} failed, will retry",
            "✗".yellow(),
            report.retryable_failures
        ));
    }
    if report.terminal_failures > 0 {
        lines.push(format!(
            "  {} {} rejected, need your action",
            "✗".red(),
            report.terminal_failures
        ));
    }
    if report.skipped > 0 {
        lines.push(format!("  {} {} skipped", "○".yellow(), report.skipped));
    }
    lines.push(format!("  {}", format!("took {} ms", report.duration_ms).dimmed()));

    lines.join("\n")
}

/// Format the result of a manual retry
pub fn format_retry_pretty(report: &RetryReport) -> String {
    if report.processed_operations == 0 && report.failed_operations == 0 {
        return "No failed operations to retry.".to_string();
    }

    let mut output = format!(
        "{} {} operations synced",
        "✓".green(),
        report.processed_operations
    );
    if report.failed_operations > 0 {
        output.push_str(&format!(
            "\n{} {} operations still failing",
            "✗".red(),
            report.failed_operations
        ));
    }
    output
}

/// Format a one-off connectivity and health check
pub fn format_health_pretty(reachable: bool, health: &HealthReport) -> String {
    let network = if reachable {
        "reachable".green()
    } else {
        "unreachable".red()
    };
    let api = match &health.status {
        HealthStatus::Healthy => "healthy".green(),
        HealthStatus::Unhealthy(reason) => format!("unhealthy ({reason})").red(),
    };

    format!(
        "Network: {network}\nAPI:     {api}\n{}",
        format!("checked {}", health.checked_at.format("%Y-%m-%d %H:%M:%S UTC")).dimmed()
    )
}
