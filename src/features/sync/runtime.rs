//! Background loops that keep the queue draining.
//!
//! `SyncRuntime` owns four tasks: the connectivity debouncer, the network
//! probe, the health check loop and the drain loop. The drain loop funnels
//! connectivity edges and timer ticks into the single
//! [`SyncService::trigger`] entry point.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::connectivity::{ConnectivityEdge, ConnectivityMonitor, NetworkProbe};
use super::health::HealthReporter;
use super::orchestrator::{SyncService, TriggerSource};

/// Shortest period any loop ticks at; tokio intervals reject zero.
const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Timing for the background loops.
///
/// Periods below 100ms are raised to 100ms.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSchedule {
    pub sync_interval: Duration,
    pub probe_interval: Duration,
    pub health_interval: Duration,
}

/// Running background tasks; dropped tasks keep running until `shutdown`.
pub struct SyncRuntime {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncRuntime {
    /// Spawn the background loops on the current tokio runtime.
    ///
    /// `probe` is optional so hosts with their own reachability events can
    /// feed the monitor directly.
    pub fn start(
        service: Arc<SyncService>,
        monitor: Arc<ConnectivityMonitor>,
        health: Option<Arc<HealthReporter>>,
        probe: Option<NetworkProbe>,
        schedule: RuntimeSchedule,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let debouncer = Arc::clone(&monitor);
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { debouncer.run_debouncer(rx).await }));

        if let Some(probe) = probe {
            tasks.push(tokio::spawn(probe_loop(
                probe,
                Arc::clone(&monitor),
                schedule.probe_interval,
                shutdown_rx.clone(),
            )));
        }

        if let Some(health) = health {
            tasks.push(tokio::spawn(health_loop(
                health,
                schedule.health_interval,
                shutdown_rx.clone(),
            )));
        }

        tasks.push(tokio::spawn(drain_loop(
            service,
            monitor,
            schedule.sync_interval,
            shutdown_rx,
        )));

        info!(tasks = tasks.len(), "sync runtime started");
        Self { shutdown, tasks }
    }

    /// Stop every loop and wait for them to finish.
    ///
    /// A pass in progress runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        info!("sync runtime stopped");
    }
}

async fn probe_loop(
    probe: NetworkProbe,
    monitor: Arc<ConnectivityMonitor>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => monitor.report(probe.check().await),
            _ = shutdown.changed() => return,
        }
    }
}

async fn health_loop(
    health: Arc<HealthReporter>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                health.check_health().await;
            }
            _ = shutdown.changed() => return,
        }
    }
}

async fn drain_loop(
    service: Arc<SyncService>,
    monitor: Arc<ConnectivityMonitor>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut edges = monitor.subscribe();

    if monitor.is_online() {
        run_pass(&service, TriggerSource::Startup).await;
    }

    let every = every.max(MIN_PERIOD);
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            edge = edges.recv() => match edge {
                Ok(ConnectivityEdge::WentOnline) => {
                    run_pass(&service, TriggerSource::ConnectivityRestored).await;
                }
                Ok(ConnectivityEdge::WentOffline) => {}
                Err(RecvError::Lagged(missed)) => debug!(missed, "connectivity events lagged"),
                Err(RecvError::Closed) => return,
            },
            _ = ticker.tick() => {
                if monitor.is_online() {
                    run_pass(&service, TriggerSource::Timer).await;
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}

async fn run_pass(service: &SyncService, source: TriggerSource) {
    if let Err(e) = service.trigger(source).await {
        error!(error = %e, %source, "drain pass failed");
    }
}
