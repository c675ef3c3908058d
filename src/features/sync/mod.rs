//! Offline operation queue and sync engine.
//!
//! Client-side mutations are queued durably whether or not the remote API is
//! reachable, then replayed in creation order once connectivity returns.
//!
//! - [`queue`]: durable FIFO store with crash recovery
//! - [`executor`]: applies one operation remotely and classifies the outcome
//! - [`orchestrator`]: drain passes, manual retry/clear, status
//! - [`connectivity`] and [`health`]: signals that decide when to drain
//! - [`runtime`]: background loops wiring it all together

pub mod connectivity;
pub mod executor;
pub mod health;
pub mod operation;
pub mod orchestrator;
pub mod queue;
pub mod runtime;

pub use connectivity::{ConnectivityEdge, ConnectivityMonitor, NetworkProbe};
pub use executor::{classify_status, HttpExecutor, Outcome, RemoteExecutor};
pub use health::{HealthReport, HealthReporter, HealthStatus, HttpLivenessProbe, LivenessProbe};
pub use operation::{
    ArchivedOperation, Failure, FailureKind, NewOperation, OperationKind, OperationStatus,
    QueuedOperation,
};
pub use orchestrator::{PassReport, RetryReport, StatusReport, SyncService, TriggerSource};
pub use queue::{QueueSnapshot, QueueStore, SqliteQueue, DEFAULT_MAX_OPERATIONS};
pub use runtime::{RuntimeSchedule, SyncRuntime};
