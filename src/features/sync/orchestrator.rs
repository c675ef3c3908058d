//! Sync orchestrator: drains the queue against the remote executor.
//!
//! At most one drain pass runs at a time. A trigger that arrives while a
//! pass is running is coalesced into a no-op; the next pass picks up
//! whatever was enqueued meanwhile. Operations within a pass run strictly
//! sequentially in creation order, and one operation's failure never stops
//! the rest of the pass.
//!
//! Store calls made from async code go through `spawn_blocking`: every
//! committed transition is fsynced, and that must not stall the runtime's
//! worker threads.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::connectivity::ConnectivityMonitor;
use super::executor::{Outcome, RemoteExecutor};
use super::health::{HealthReport, HealthReporter};
use super::operation::{FailureKind, NewOperation, OperationStatus, QueuedOperation};
use super::queue::{QueueSnapshot, QueueStore};
use crate::config::SyncConfig;
use crate::error::{FintrackError, Result};

/// What started a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Offline to online edge from the connectivity monitor
    ConnectivityRestored,
    /// Periodic timer tick
    Timer,
    /// Explicit host request; includes terminal failures
    Manual,
    /// First pass after the process starts
    Startup,
}

impl TriggerSource {
    /// Automatic passes honour the health gate, skip terminal failures and
    /// respect the attempt ceiling.
    #[must_use]
    pub const fn is_automatic(&self) -> bool {
        !matches!(self, Self::Manual)
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectivityRestored => "connectivity restored",
            Self::Timer => "timer",
            Self::Manual => "manual",
            Self::Startup => "startup",
        };
        write!(f, "{name}")
    }
}

/// Summary of one completed drain pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub source: TriggerSource,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Operations handed to the executor
    pub attempted: usize,
    pub succeeded: usize,
    pub retryable_failures: usize,
    pub terminal_failures: usize,
    /// Operations that vanished or changed state under the pass
    pub skipped: usize,
}

impl PassReport {
    fn start(source: TriggerSource) -> Self {
        Self {
            source,
            started_at: Utc::now(),
            duration_ms: 0,
            attempted: 0,
            succeeded: 0,
            retryable_failures: 0,
            terminal_failures: 0,
            skipped: 0,
        }
    }

    /// Operations whose attempt in this pass failed.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.retryable_failures + self.terminal_failures
    }
}

/// Result of a manual retry of failed operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryReport {
    /// Operations that succeeded this time
    pub processed_operations: usize,
    /// Operations that failed again
    pub failed_operations: usize,
}

/// Everything the host needs to render sync status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub queue: QueueSnapshot,
    /// Debounced connectivity, when a monitor is attached
    pub online: Option<bool>,
    pub health: Option<HealthReport>,
    pub health_fresh: bool,
    pub pass_in_progress: bool,
    pub last_pass: Option<PassReport>,
}

/// Clears the pass flag when the pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// How one operation's attempt ended, from the pass's point of view.
enum Attempt {
    Done(Outcome),
    Skipped,
}

/// Drives the queue to empty whenever conditions allow.
pub struct SyncService {
    store: Arc<dyn QueueStore>,
    executor: Arc<dyn RemoteExecutor>,
    health: Option<Arc<HealthReporter>>,
    connectivity: Option<Arc<ConnectivityMonitor>>,
    config: SyncConfig,
    in_progress: AtomicBool,
    last_pass: Mutex<Option<PassReport>>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn QueueStore>,
        executor: Arc<dyn RemoteExecutor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            executor,
            health: None,
            connectivity: None,
            config,
            in_progress: AtomicBool::new(false),
            last_pass: Mutex::new(None),
        }
    }

    /// Consult this reporter before automatic passes.
    #[must_use]
    pub fn with_health(mut self, health: Arc<HealthReporter>) -> Self {
        self.health = Some(health);
        self
    }

    /// Include this monitor's state in status reports.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Arc<ConnectivityMonitor>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Queue a mutation. Always allowed, online or not.
    ///
    /// # Errors
    ///
    /// Returns `StorageFull` if the operation cannot be persisted.
    pub fn enqueue(&self, operation: NewOperation) -> Result<String> {
        self.store.enqueue(operation)
    }

    /// Whether a drain pass is currently running.
    #[must_use]
    pub fn pass_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run a drain pass over pending and failed operations.
    ///
    /// Returns `None` when the trigger was coalesced into a running pass or
    /// skipped because the remote is known to be unhealthy.
    ///
    /// # Errors
    ///
    /// Returns an error only for store-level failures; remote failures are
    /// recorded on the operations.
    pub async fn trigger(&self, source: TriggerSource) -> Result<Option<PassReport>> {
        if source.is_automatic() && self.should_skip_for_health() {
            info!(%source, "remote unhealthy, skipping drain pass");
            return Ok(None);
        }

        let Some(_guard) = PassGuard::acquire(&self.in_progress) else {
            debug!(%source, "drain pass already running, trigger coalesced");
            return Ok(None);
        };

        let max_attempts = self.config.max_automatic_attempts;
        let work: Vec<QueuedOperation> = self
            .on_store(|store| store.list_pending())
            .await?
            .into_iter()
            .filter(|op| !source.is_automatic() || op.eligible_for_automatic_retry(max_attempts))
            .collect();

        let report = self.run_pass(source, work).await?;
        Ok(Some(report))
    }

    /// Immediately retry every failed operation, terminal ones included.
    ///
    /// A call that arrives while a pass is running is coalesced and reports
    /// zero counts.
    ///
    /// # Errors
    ///
    /// Returns an error only for store-level failures.
    pub async fn retry_failed_operations(&self) -> Result<RetryReport> {
        let Some(_guard) = PassGuard::acquire(&self.in_progress) else {
            debug!("drain pass already running, retry coalesced");
            return Ok(RetryReport::default());
        };

        let work = self
            .on_store(|store| store.list_by_status(OperationStatus::Failed))
            .await?;
        let report = self.run_pass(TriggerSource::Manual, work).await?;
        Ok(RetryReport {
            processed_operations: report.succeeded,
            failed_operations: report.failed(),
        })
    }

    /// Put one failed operation back to pending without draining.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `InvalidTransition` if the
    /// operation is not failed.
    pub fn retry_operation(&self, id: &str) -> Result<()> {
        self.store.requeue(id)?;
        info!(id, "operation requeued for retry");
        Ok(())
    }

    /// Remove every failed operation. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub fn clear_failed_operations(&self) -> Result<usize> {
        let removed = self.store.clear_failed()?;
        if removed > 0 {
            info!(removed, "cleared failed operations");
        }
        Ok(removed)
    }

    /// Current queue aggregates.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get_queue_status(&self) -> Result<QueueSnapshot> {
        self.store.snapshot()
    }

    /// Queue aggregates plus connectivity, health and the last pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn status_report(&self) -> Result<StatusReport> {
        let health = self.health.as_ref().and_then(|h| h.latest());
        Ok(StatusReport {
            queue: self.store.snapshot()?,
            online: self.connectivity.as_ref().map(|c| c.is_online()),
            health_fresh: self.health.as_ref().is_some_and(|h| h.is_fresh()),
            health,
            pass_in_progress: self.pass_in_progress(),
            last_pass: self.last_pass(),
        })
    }

    /// The most recent completed pass.
    #[must_use]
    pub fn last_pass(&self) -> Option<PassReport> {
        self.last_pass.lock().ok().and_then(|last| last.clone())
    }

    /// Only a fresh unhealthy result suppresses a pass; a stale one says
    /// nothing about the remote now.
    fn should_skip_for_health(&self) -> bool {
        self.config.skip_when_unhealthy
            && self
                .health
                .as_ref()
                .is_some_and(|h| h.is_fresh() && h.known_unhealthy())
    }

    /// Run a store call on the blocking pool.
    async fn on_store<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn QueueStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || call(store.as_ref()))
            .await
            .map_err(|e| FintrackError::Database(format!("queue task failed: {e}")))?
    }

    /// Put operations this pass claimed back to pending after it aborted.
    ///
    /// Only one pass runs at a time, so every in-flight row belongs to it.
    async fn release_claimed(&self) {
        match self.on_store(|store| store.recover_in_flight()).await {
            Ok(0) => {}
            Ok(released) => warn!(released, "returned interrupted operations to pending"),
            Err(e) => error!(error = %e, "could not release in-flight operations"),
        }
    }

    async fn run_pass(
        &self,
        source: TriggerSource,
        work: Vec<QueuedOperation>,
    ) -> Result<PassReport> {
        let started = Instant::now();
        let mut report = PassReport::start(source);
        debug!(%source, operations = work.len(), "drain pass started");

        for operation in work {
            match self.attempt(operation).await {
                Ok(Attempt::Done(outcome)) => {
                    report.attempted += 1;
                    match outcome {
                        Outcome::Success => report.succeeded += 1,
                        Outcome::RetryableFailure(_) => report.retryable_failures += 1,
                        Outcome::TerminalFailure(_) => report.terminal_failures += 1,
                    }
                }
                Ok(Attempt::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(error = %e, %source, "drain pass aborted");
                    self.release_claimed().await;
                    return Err(e);
                }
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            %source,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed(),
            skipped = report.skipped,
            "drain pass finished"
        );

        if let Ok(mut last) = self.last_pass.lock() {
            *last = Some(report.clone());
        }
        Ok(report)
    }

    /// Execute one operation and write the outcome back.
    ///
    /// Queue-usage errors mean the operation was cleared or retried by
    /// someone else after the pass listed it; those skip the operation.
    /// Any other store error aborts the pass.
    async fn attempt(&self, mut operation: QueuedOperation) -> Result<Attempt> {
        let id = operation.id.clone();

        let was_failed = operation.status == OperationStatus::Failed;
        let claim_id = id.clone();
        let claimed = self
            .on_store(move |store| {
                if was_failed {
                    store.requeue(&claim_id)?;
                }
                store.mark_in_flight(&claim_id)
            })
            .await;
        match claimed {
            Ok(()) => {}
            Err(e) if e.is_usage_error() => {
                warn!(id, error = %e, "operation changed during pass, skipping");
                return Ok(Attempt::Skipped);
            }
            Err(e) => return Err(e),
        }

        operation.status = OperationStatus::InFlight;
        operation.attempt_count += 1;
        operation.failure_kind = None;
        debug!(id, kind = %operation.kind, attempt = operation.attempt_count, "executing operation");

        let timeout = self.config.execute_timeout();
        let outcome = tokio::time::timeout(timeout, self.executor.execute(&operation))
            .await
            .unwrap_or_else(|_| {
                Outcome::RetryableFailure(format!("timed out after {}s", timeout.as_secs()))
            });

        let failure = outcome.clone().into_failure();
        if let Some(failure) = &failure {
            match failure.kind {
                FailureKind::Retryable => {
                    warn!(id, reason = %failure.reason, "operation failed, will retry");
                }
                FailureKind::Terminal => {
                    warn!(id, reason = %failure.reason, "operation rejected, needs attention");
                }
            }
        }
        let record_id = id.clone();
        let recorded = self
            .on_store(move |store| match failure {
                None => store.mark_succeeded(&record_id),
                Some(failure) => store.mark_failed(&record_id, &failure),
            })
            .await;

        match recorded {
            Ok(()) => Ok(Attempt::Done(outcome)),
            Err(e) if e.is_usage_error() => {
                warn!(id, error = %e, "operation removed while executing");
                Ok(Attempt::Done(outcome))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use mockall::predicate::always;
    use mockall::Sequence;

    use super::*;
    use crate::features::sync::executor::MockRemoteExecutor;
    use crate::features::sync::operation::{ArchivedOperation, Failure};
    use crate::features::sync::health::{HealthStatus, LivenessProbe};
    use crate::features::sync::operation::OperationKind;
    use crate::features::sync::queue::SqliteQueue;
    use crate::storage::Database;

    fn store() -> Arc<SqliteQueue> {
        Arc::new(SqliteQueue::with_database(Database::open_in_memory().unwrap()).unwrap())
    }

    fn service(store: &Arc<SqliteQueue>, executor: MockRemoteExecutor) -> SyncService {
        SyncService::new(store.clone(), Arc::new(executor), SyncConfig::default())
    }

    fn enqueue(store: &SqliteQueue, label: &str) -> String {
        store
            .enqueue(NewOperation::new(
                OperationKind::Create,
                "transaction",
                format!(r#"{{"memo":"{label}"}}"#),
            ))
            .unwrap()
    }

    struct Down;

    #[async_trait]
    impl LivenessProbe for Down {
        async fn probe(&self) -> HealthStatus {
            HealthStatus::Unhealthy("HTTP 503".into())
        }
    }

    /// Delegates to a real queue but fails the first `mark_failed` the way
    /// a busy database does.
    struct LockedOnce {
        inner: Arc<SqliteQueue>,
        tripped: AtomicBool,
    }

    impl QueueStore for LockedOnce {
        fn enqueue(&self, operation: NewOperation) -> Result<String> {
            self.inner.enqueue(operation)
        }
        fn list_pending(&self) -> Result<Vec<QueuedOperation>> {
            self.inner.list_pending()
        }
        fn list_by_status(&self, status: OperationStatus) -> Result<Vec<QueuedOperation>> {
            self.inner.list_by_status(status)
        }
        fn get(&self, id: &str) -> Result<Option<QueuedOperation>> {
            self.inner.get(id)
        }
        fn mark_in_flight(&self, id: &str) -> Result<()> {
            self.inner.mark_in_flight(id)
        }
        fn mark_succeeded(&self, id: &str) -> Result<()> {
            self.inner.mark_succeeded(id)
        }
        fn mark_failed(&self, id: &str, failure: &Failure) -> Result<()> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(FintrackError::Database("database is locked".into()));
            }
            self.inner.mark_failed(id, failure)
        }
        fn requeue(&self, id: &str) -> Result<()> {
            self.inner.requeue(id)
        }
        fn clear_failed(&self) -> Result<usize> {
            self.inner.clear_failed()
        }
        fn recover_in_flight(&self) -> Result<usize> {
            self.inner.recover_in_flight()
        }
        fn snapshot(&self) -> Result<QueueSnapshot> {
            self.inner.snapshot()
        }
        fn history(&self, limit: usize) -> Result<Vec<ArchivedOperation>> {
            self.inner.history(limit)
        }
        fn prune_history(&self, cutoff: DateTime<Utc>) -> Result<usize> {
            self.inner.prune_history(cutoff)
        }
    }

    struct Slow(Duration);

    #[async_trait]
    impl RemoteExecutor for Slow {
        async fn execute(&self, _operation: &QueuedOperation) -> Outcome {
            tokio::time::sleep(self.0).await;
            Outcome::Success
        }
    }

    #[tokio::test]
    async fn test_pass_executes_in_creation_order() {
        let store = store();
        enqueue(&store, "A");
        enqueue(&store, "B");
        enqueue(&store, "C");

        let mut executor = MockRemoteExecutor::new();
        let mut seq = Sequence::new();
        for label in ["A", "B", "C"] {
            executor
                .expect_execute()
                .withf(move |op| op.payload.contains(label))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Outcome::Success);
        }

        let report = service(&store, executor)
            .trigger(TriggerSource::Timer)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(store.snapshot().unwrap(), QueueSnapshot::default());
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_pass() {
        let store = store();
        let rejected = enqueue(&store, "bad");
        let flaky = enqueue(&store, "flaky");
        enqueue(&store, "good");

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_execute()
            .returning(|op| match op.payload.as_str() {
                p if p.contains("bad") => Outcome::TerminalFailure("HTTP 422".into()),
                p if p.contains("flaky") => Outcome::RetryableFailure("HTTP 503".into()),
                _ => Outcome::Success,
            });

        let report = service(&store, executor)
            .trigger(TriggerSource::ConnectivityRestored)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.retryable_failures, 1);
        assert_eq!(report.terminal_failures, 1);

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.total_operations, 2);
        assert_eq!(snapshot.failed_operations, 2);
        assert_eq!(snapshot.terminal_failed_operations, 1);
        assert!(store.get(&rejected).unwrap().unwrap().is_terminal_failure());
        assert_eq!(
            store.get(&flaky).unwrap().unwrap().last_error.as_deref(),
            Some("HTTP 503")
        );
    }

    #[tokio::test]
    async fn test_automatic_pass_skips_terminal_failures() {
        let store = store();
        let id = enqueue(&store, "bad");
        store.mark_in_flight(&id).unwrap();
        store.mark_failed(&id, &crate::features::sync::Failure::terminal("HTTP 422")).unwrap();

        let mut executor = MockRemoteExecutor::new();
        executor.expect_execute().times(0);

        let report = service(&store, executor)
            .trigger(TriggerSource::Timer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(store.get(&id).unwrap().unwrap().attempt_count, 1);
    }

    #[tokio::test]
    async fn test_manual_trigger_includes_terminal_failures() {
        let store = store();
        let id = enqueue(&store, "fixed server-side");
        store.mark_in_flight(&id).unwrap();
        store.mark_failed(&id, &crate::features::sync::Failure::terminal("HTTP 409")).unwrap();

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_execute()
            .with(always())
            .times(1)
            .returning(|_| Outcome::Success);

        let report = service(&store, executor)
            .trigger(TriggerSource::Manual)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(store.get(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attempt_ceiling_stops_automatic_retries() {
        let store = store();
        let id = enqueue(&store, "flaky");

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_execute()
            .times(2)
            .returning(|_| Outcome::RetryableFailure("HTTP 503".into()));

        let config = SyncConfig {
            max_automatic_attempts: Some(2),
            ..SyncConfig::default()
        };
        let service = SyncService::new(store.clone(), Arc::new(executor), config);

        for _ in 0..4 {
            service.trigger(TriggerSource::Timer).await.unwrap();
        }

        let op = store.get(&id).unwrap().unwrap();
        assert_eq!(op.attempt_count, 2);
        assert_eq!(op.status, OperationStatus::Failed);
    }

    #[tokio::test]
    async fn test_retry_failed_operations() {
        let store = store();
        let id = enqueue(&store, "one");
        enqueue(&store, "pending");
        store.mark_in_flight(&id).unwrap();
        store.mark_failed(&id, &crate::features::sync::Failure::retryable("HTTP 503")).unwrap();

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_execute()
            .withf(|op| op.payload.contains("one") && op.attempt_count == 2)
            .times(1)
            .returning(|_| Outcome::Success);

        let report = service(&store, executor).retry_failed_operations().await.unwrap();

        assert_eq!(
            report,
            RetryReport {
                processed_operations: 1,
                failed_operations: 0
            }
        );
        // restricted to failed entries
        assert_eq!(store.snapshot().unwrap().pending_operations, 1);
    }

    #[tokio::test]
    async fn test_unhealthy_remote_skips_automatic_passes_only() {
        let store = store();
        enqueue(&store, "A");

        let health = Arc::new(HealthReporter::new(Arc::new(Down), Duration::from_secs(90)));
        health.check_health().await;

        let mut executor = MockRemoteExecutor::new();
        executor.expect_execute().times(1).returning(|_| Outcome::Success);
        let service = service(&store, executor).with_health(health);

        assert!(service.trigger(TriggerSource::Timer).await.unwrap().is_none());
        assert_eq!(store.snapshot().unwrap().pending_operations, 1);

        let report = service.trigger(TriggerSource::Manual).await.unwrap().unwrap();
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_remote_call_times_out_as_retryable() {
        let store = store();
        let id = enqueue(&store, "A");

        let config = SyncConfig {
            execute_timeout_secs: 1,
            ..SyncConfig::default()
        };
        let service = SyncService::new(
            store.clone(),
            Arc::new(Slow(Duration::from_secs(600))),
            config,
        );

        let report = service.trigger(TriggerSource::Timer).await.unwrap().unwrap();

        assert_eq!(report.retryable_failures, 1);
        let op = store.get(&id).unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.last_error.as_deref(), Some("timed out after 1s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_trigger_is_coalesced() {
        let store = store();
        enqueue(&store, "A");
        enqueue(&store, "B");

        let service = Arc::new(SyncService::new(
            store.clone(),
            Arc::new(Slow(Duration::from_secs(5))),
            SyncConfig::default(),
        ));

        let first = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.trigger(TriggerSource::Timer).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(service.pass_in_progress());

        assert!(service.trigger(TriggerSource::Manual).await.unwrap().is_none());
        assert_eq!(
            service.retry_failed_operations().await.unwrap(),
            RetryReport::default()
        );

        let report = first.await.unwrap().unwrap().unwrap();
        assert_eq!(report.succeeded, 2);
        assert!(!service.pass_in_progress());
        assert!(store.history(10).unwrap().iter().all(|op| op.attempt_count == 1));
    }

    #[tokio::test]
    async fn test_operation_cleared_mid_pass_is_skipped() {
        let store = store();
        let first = enqueue(&store, "A");
        let second = enqueue(&store, "B");
        store.mark_in_flight(&second).unwrap();
        store.mark_failed(&second, &crate::features::sync::Failure::retryable("x")).unwrap();

        // clears the failed operation while the pass is on the first one
        let clearing_store = store.clone();
        let mut executor = MockRemoteExecutor::new();
        executor.expect_execute().times(1).returning(move |_| {
            clearing_store.clear_failed().unwrap();
            Outcome::Success
        });

        let report = service(&store, executor)
            .trigger(TriggerSource::Manual)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 1);
        assert!(store.get(&first).unwrap().is_none());
        assert!(store.get(&second).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_report() {
        let store = store();
        enqueue(&store, "A");

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Outcome::RetryableFailure("HTTP 502".into()));
        let monitor = Arc::new(ConnectivityMonitor::new(true, Duration::from_secs(2)));
        let service = service(&store, executor).with_connectivity(monitor);

        let before = service.status_report().unwrap();
        assert!(before.last_pass.is_none());
        assert_eq!(before.online, Some(true));
        assert!(!before.health_fresh);

        service.trigger(TriggerSource::Startup).await.unwrap();

        let after = service.status_report().unwrap();
        assert_eq!(after.queue.failed_operations, 1);
        let last = after.last_pass.unwrap();
        assert_eq!(last.source, TriggerSource::Startup);
        assert_eq!(last.retryable_failures, 1);
    }

    #[test]
    fn test_retry_operation_and_clear() {
        let store = store();
        let id = enqueue(&store, "A");
        let service = service(&store, MockRemoteExecutor::new());

        assert!(service.retry_operation(&id).unwrap_err().is_usage_error());
        assert!(service.retry_operation("missing").unwrap_err().is_usage_error());

        store.mark_in_flight(&id).unwrap();
        store.mark_failed(&id, &crate::features::sync::Failure::terminal("HTTP 400")).unwrap();
        service.retry_operation(&id).unwrap();
        assert_eq!(
            store.get(&id).unwrap().unwrap().status,
            OperationStatus::Pending
        );

        store.mark_in_flight(&id).unwrap();
        store.mark_failed(&id, &crate::features::sync::Failure::terminal("HTTP 400")).unwrap();
        assert_eq!(service.clear_failed_operations().unwrap(), 1);
        assert_eq!(service.clear_failed_operations().unwrap(), 0);
        assert_eq!(service.get_queue_status().unwrap().total_operations, 0);
    }

    #[tokio::test]
    async fn test_aborted_pass_returns_claimed_operation_to_pending() {
        let inner = store();
        let id = enqueue(&inner, "A");
        let store = Arc::new(LockedOnce {
            inner: inner.clone(),
            tripped: AtomicBool::new(false),
        });

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_execute()
            .times(2)
            .returning(|_| Outcome::RetryableFailure("HTTP 503".into()));
        let service = SyncService::new(store, Arc::new(executor), SyncConfig::default());

        let err = service.trigger(TriggerSource::Timer).await.unwrap_err();
        assert!(matches!(err, FintrackError::Database(_)));

        let op = inner.get(&id).unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempt_count, 1);
        assert_eq!(inner.list_pending().unwrap().len(), 1);

        let report = service.trigger(TriggerSource::Manual).await.unwrap().unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.retryable_failures, 1);
        assert_eq!(inner.get(&id).unwrap().unwrap().attempt_count, 2);
    }

    #[tokio::test]
    async fn test_stale_unhealthy_result_does_not_skip_passes() {
        let store = store();
        enqueue(&store, "A");

        let health = Arc::new(HealthReporter::new(Arc::new(Down), Duration::ZERO));
        health.check_health().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(health.known_unhealthy());
        assert!(!health.is_fresh());

        let mut executor = MockRemoteExecutor::new();
        executor.expect_execute().times(1).returning(|_| Outcome::Success);
        let service = service(&store, executor).with_health(health);

        let report = service.trigger(TriggerSource::Timer).await.unwrap().unwrap();
        assert_eq!(report.succeeded, 1);
    }
}
