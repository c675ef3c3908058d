//! Configuration management for fintrack-sync.
//!
//! This module handles loading configuration from `~/.fintrack/`.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{
    ApiConfig, ColorSetting, Config, ConnectivityConfig, GeneralConfig, HealthConfig, QueueConfig,
    SyncConfig,
};
