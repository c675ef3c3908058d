//! Commands that talk to the fintrack API.

use std::sync::Arc;

use colored::Colorize;
use serde_json::json;
use tracing::info;

use crate::cli::args::OutputFormat;
use crate::cli::Context;
use crate::error::FintrackError;
use crate::features::sync::{
    ConnectivityMonitor, HealthReporter, HttpLivenessProbe, LivenessProbe, NetworkProbe,
    RuntimeSchedule, SqliteQueue, SyncRuntime, TriggerSource,
};
use crate::output::{format_health_pretty, format_pass, format_retry, format_snapshot, to_json};

/// Run one manual drain pass.
///
/// # Errors
///
/// Returns an error for store-level failures; remote failures are recorded
/// on the operations and reported in the output.
pub async fn drain(ctx: &Context, queue: Arc<SqliteQueue>) -> Result<String, FintrackError> {
    let service = ctx.sync_service(queue)?;

    match service.trigger(TriggerSource::Manual).await? {
        Some(report) => format_pass(&report, ctx.format),
        None => Ok("A drain pass is already running.".to_string()),
    }
}

/// Immediately replay every failed operation.
///
/// # Errors
///
/// Returns an error for store-level failures.
pub async fn retry_failed(ctx: &Context, queue: Arc<SqliteQueue>) -> Result<String, FintrackError> {
    let service = ctx.sync_service(queue)?;
    let report = service.retry_failed_operations().await?;
    format_retry(&report, ctx.format)
}

/// Check network reachability and API liveness once.
///
/// # Errors
///
/// Returns an error if `api.base_url` is invalid.
pub async fn health(ctx: &Context) -> Result<String, FintrackError> {
    let api = &ctx.config.api;
    let probe = NetworkProbe::new(api.socket_address()?, ctx.config.connectivity.probe_timeout());
    let liveness: Arc<dyn LivenessProbe> = Arc::new(HttpLivenessProbe::new(api)?);
    let reporter = HealthReporter::new(liveness, ctx.config.health.stale_after());

    let (reachable, report) = tokio::join!(probe.check(), reporter.check_health());

    match ctx.format {
        OutputFormat::Json => to_json(&json!({
            "networkReachable": reachable,
            "health": report,
        })),
        OutputFormat::Pretty => Ok(format_health_pretty(reachable, &report)),
    }
}

/// Run the background sync loops until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the service cannot be built or the signal handler
/// cannot be installed.
pub async fn watch(ctx: &Context, queue: Arc<SqliteQueue>) -> Result<String, FintrackError> {
    let config = &ctx.config;
    let probe = NetworkProbe::new(
        config.api.socket_address()?,
        config.connectivity.probe_timeout(),
    );
    let initially_online = probe.check().await;

    let monitor = Arc::new(ConnectivityMonitor::new(
        initially_online,
        config.connectivity.dwell(),
    ));
    let health = Arc::new(HealthReporter::new(
        Arc::new(HttpLivenessProbe::new(&config.api)?),
        config.health.stale_after(),
    ));
    if initially_online {
        health.check_health().await;
    }

    let service = Arc::new(
        ctx.sync_service(queue)?
            .with_health(Arc::clone(&health))
            .with_connectivity(Arc::clone(&monitor)),
    );

    let schedule = RuntimeSchedule {
        sync_interval: config.sync.interval(),
        probe_interval: config.connectivity.probe_interval(),
        health_interval: config.health.interval(),
    };

    if ctx.format == OutputFormat::Pretty {
        eprintln!(
            "{} syncing with {} ({}), Ctrl-C to stop",
            "→".cyan(),
            config.api.base_url,
            if initially_online { "online".green() } else { "offline".yellow() }
        );
    }

    let runtime = SyncRuntime::start(
        Arc::clone(&service),
        monitor,
        Some(health),
        Some(probe),
        schedule,
    );

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    runtime.shutdown().await;

    let snapshot = service.get_queue_status()?;
    format_snapshot(&snapshot, ctx.format)
}
