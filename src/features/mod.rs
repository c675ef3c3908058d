//! Feature implementations for fintrack-sync.
//!
//! - Offline operation queue and sync engine

pub mod sync;
