//! Network connectivity signal with debounced edge detection.
//!
//! Raw reachability reports go in through [`ConnectivityMonitor::report`].
//! The debouncer publishes a change only after the raw signal has held the
//! same value for the dwell time, so rapid flapping collapses into at most
//! one edge.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

/// A debounced transition of the online signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityEdge {
    WentOnline,
    WentOffline,
}

const EDGE_CAPACITY: usize = 16;

pub struct ConnectivityMonitor {
    raw: watch::Sender<bool>,
    stable: watch::Sender<bool>,
    edges: broadcast::Sender<ConnectivityEdge>,
    dwell: Duration,
}

impl ConnectivityMonitor {
    #[must_use]
    pub fn new(initially_online: bool, dwell: Duration) -> Self {
        let (raw, _) = watch::channel(initially_online);
        let (stable, _) = watch::channel(initially_online);
        let (edges, _) = broadcast::channel(EDGE_CAPACITY);
        Self {
            raw,
            stable,
            edges,
            dwell,
        }
    }

    /// Feed one raw reachability observation.
    pub fn report(&self, online: bool) {
        let changed = self.raw.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            debug!(online, "raw connectivity changed");
        }
    }

    /// Debounced online state.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.stable.borrow()
    }

    /// Receiver for the debounced online state.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.stable.subscribe()
    }

    /// Receive one event per debounced transition.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEdge> {
        self.edges.subscribe()
    }

    /// Debounce raw reports until `shutdown` flips or its sender is dropped.
    pub async fn run_debouncer(&self, mut shutdown: watch::Receiver<bool>) {
        let mut raw = self.raw.subscribe();
        // a report made before we subscribed still needs debouncing
        if *raw.borrow() != *self.stable.borrow() {
            raw.mark_changed();
        }

        loop {
            tokio::select! {
                changed = raw.changed() => if changed.is_err() { return },
                _ = shutdown.changed() => return,
            }

            // restart the dwell window on every further change
            loop {
                tokio::select! {
                    changed = raw.changed() => if changed.is_err() { return },
                    () = tokio::time::sleep(self.dwell) => break,
                    _ = shutdown.changed() => return,
                }
            }

            let online = *raw.borrow_and_update();
            let previous = self.stable.send_replace(online);
            if previous != online {
                let edge = if online {
                    ConnectivityEdge::WentOnline
                } else {
                    ConnectivityEdge::WentOffline
                };
                info!(?edge, "connectivity changed");
                // no subscribers is fine
                let _ = self.edges.send(edge);
            }
        }
    }
}

/// TCP reachability check against the API host.
#[derive(Debug, Clone)]
pub struct NetworkProbe {
    address: String,
    timeout: Duration,
}

impl NetworkProbe {
    #[must_use]
    pub const fn new(address: String, timeout: Duration) -> Self {
        Self { address, timeout }
    }

    /// Whether a TCP connection to the API host succeeds within the timeout.
    pub async fn check(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::sleep;

    use super::*;

    const DWELL: Duration = Duration::from_secs(2);

    fn start(initially_online: bool) -> (Arc<ConnectivityMonitor>, watch::Sender<bool>) {
        let monitor = Arc::new(ConnectivityMonitor::new(initially_online, DWELL));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let debouncer = Arc::clone(&monitor);
        tokio::spawn(async move { debouncer.run_debouncer(shutdown_rx).await });
        (monitor, shutdown_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_change_emits_one_edge() {
        let (monitor, _shutdown) = start(false);
        let mut edges = monitor.subscribe();

        monitor.report(true);
        sleep(Duration::from_millis(500)).await;
        assert!(!monitor.is_online());

        sleep(DWELL).await;
        assert!(monitor.is_online());
        assert_eq!(edges.recv().await.unwrap(), ConnectivityEdge::WentOnline);
        assert_eq!(edges.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flapping_collapses_to_single_edge() {
        let (monitor, _shutdown) = start(false);
        let mut edges = monitor.subscribe();

        for online in [true, false, true, false, true] {
            monitor.report(online);
            sleep(Duration::from_millis(300)).await;
        }
        sleep(DWELL * 2).await;

        assert!(monitor.is_online());
        assert_eq!(edges.recv().await.unwrap(), ConnectivityEdge::WentOnline);
        assert_eq!(edges.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flap_back_to_same_state_emits_nothing() {
        let (monitor, _shutdown) = start(false);
        let mut edges = monitor.subscribe();

        monitor.report(true);
        sleep(Duration::from_millis(100)).await;
        monitor.report(false);
        sleep(DWELL * 3).await;

        assert!(!monitor.is_online());
        assert_eq!(edges.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_going_offline_is_reported() {
        let (monitor, _shutdown) = start(true);
        let mut edges = monitor.subscribe();
        let mut online = monitor.watch();

        monitor.report(false);
        online.changed().await.unwrap();

        assert!(!*online.borrow());
        assert_eq!(edges.recv().await.unwrap(), ConnectivityEdge::WentOffline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_before_debouncer_starts_is_not_lost() {
        let monitor = Arc::new(ConnectivityMonitor::new(false, DWELL));
        let mut edges = monitor.subscribe();
        monitor.report(true);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let debouncer = Arc::clone(&monitor);
        tokio::spawn(async move { debouncer.run_debouncer(shutdown_rx).await });
        sleep(DWELL * 2).await;

        assert!(monitor.is_online());
        assert_eq!(edges.recv().await.unwrap(), ConnectivityEdge::WentOnline);
    }

    #[tokio::test]
    async fn test_network_probe() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let reachable = NetworkProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(reachable.check().await);

        drop(listener);
        let unreachable = NetworkProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(!unreachable.check().await);
    }
}
