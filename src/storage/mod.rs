//! Storage layer for fintrack-sync.
//!
//! `SQLite`-based persistence for the offline operation queue and the
//! archive of operations already applied remotely.

mod database;
mod migrations;

pub use database::Database;
