//! fintrack-sync - offline operation queue and sync engine for fintrack
//!
//! Client-side mutations are recorded durably while offline and replayed
//! against the fintrack API, in order, once connectivity returns.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod output;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::FintrackError;
pub use features::sync::{
    NewOperation, OperationKind, Outcome, QueueSnapshot, QueueStore, RemoteExecutor, SqliteQueue,
    SyncService, TriggerSource,
};
