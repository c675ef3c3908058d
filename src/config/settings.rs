//! Configuration settings for fintrack-sync.
//!
//! Settings are loaded from `~/.fintrack/config.yaml`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::FintrackError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Remote API settings.
    pub api: ApiConfig,
    /// Drain pass settings.
    pub sync: SyncConfig,
    /// Queue storage settings.
    pub queue: QueueConfig,
    /// Network reachability settings.
    pub connectivity: ConnectivityConfig,
    /// Remote liveness settings.
    pub health: HealthConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    /// Color output setting.
    #[serde(default = "default_color")]
    pub color: ColorSetting,
}

/// Color output setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorSetting {
    /// Auto-detect based on terminal.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

/// Remote API the queue is replayed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every route is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Liveness endpoint, relative to `base_url`.
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Route overrides keyed by target entity.
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
}

/// Drain pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between timer-triggered passes while online.
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
    /// Upper bound on a single remote call, in seconds.
    #[serde(default = "default_execute_timeout")]
    pub execute_timeout_secs: u64,
    /// Skip automatic passes while the last health check is unhealthy.
    #[serde(default = "default_true")]
    pub skip_when_unhealthy: bool,
    /// Stop retrying automatically after this many attempts.
    #[serde(default)]
    pub max_automatic_attempts: Option<u32>,
}

/// Queue storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the active queue.
    #[serde(default = "default_max_operations")]
    pub max_operations: usize,
}

/// Network reachability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// How long the raw signal must be stable before an edge is reported.
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
    /// Seconds between reachability probes.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    /// Probe connect timeout in milliseconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

/// Remote liveness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between liveness checks.
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    /// A cached result older than this is reported as stale.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

const fn default_color() -> ColorSetting {
    ColorSetting::Auto
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

const fn default_request_timeout() -> u64 {
    15
}

const fn default_sync_interval() -> u64 {
    60
}

const fn default_execute_timeout() -> u64 {
    20
}

const fn default_true() -> bool {
    true
}

const fn default_max_operations() -> usize {
    crate::features::sync::DEFAULT_MAX_OPERATIONS
}

const fn default_dwell_ms() -> u64 {
    2_000
}

const fn default_probe_interval() -> u64 {
    10
}

const fn default_probe_timeout() -> u64 {
    3_000
}

const fn default_health_interval() -> u64 {
    30
}

const fn default_stale_after() -> u64 {
    90
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
            color: default_color(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            health_path: default_health_path(),
            request_timeout_secs: default_request_timeout(),
            routes: BTreeMap::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval(),
            execute_timeout_secs: default_execute_timeout(),
            skip_when_unhealthy: default_true(),
            max_automatic_attempts: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            dwell_ms: default_dwell_ms(),
            probe_interval_secs: default_probe_interval(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

impl ApiConfig {
    /// Path for a target entity: the configured override, else the
    /// pluralised entity name (`transaction` -> `/transactions`).
    #[must_use]
    pub fn route_for(&self, entity: &str) -> String {
        if let Some(route) = self.routes.get(entity) {
            return route.clone();
        }
        match entity.strip_suffix('y') {
            Some(stem) if !stem.is_empty() => format!("/{stem}ies"),
            _ => format!("/{entity}s"),
        }
    }

    /// Absolute URL for a path relative to `base_url`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// `host:port` of the API, for reachability probes.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid http(s) URL.
    pub fn socket_address(&self) -> Result<String, FintrackError> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| FintrackError::Config(format!("Invalid api.base_url: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| FintrackError::Config("api.base_url has no host".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| FintrackError::Config("api.base_url has no port".to_string()))?;
        Ok(format!("{host}:{port}"))
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.execute_timeout_secs)
    }
}

impl ConnectivityConfig {
    #[must_use]
    pub const fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl HealthConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, FintrackError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails [`Config::validate`].
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, FintrackError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            FintrackError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            FintrackError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot rule out.
    ///
    /// Intervals and timeouts must be non-zero.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first offending key.
    pub fn validate(&self) -> Result<(), FintrackError> {
        let durations = [
            ("api.request_timeout_secs", self.api.request_timeout_secs),
            ("sync.interval_secs", self.sync.interval_secs),
            ("sync.execute_timeout_secs", self.sync.execute_timeout_secs),
            (
                "connectivity.probe_interval_secs",
                self.connectivity.probe_interval_secs,
            ),
            ("connectivity.probe_timeout_ms", self.connectivity.probe_timeout_ms),
            ("health.interval_secs", self.health.interval_secs),
        ];
        if let Some((key, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(FintrackError::Config(format!("{key} must be greater than 0")));
        }
        if self.queue.max_operations == 0 {
            return Err(FintrackError::Config(
                "queue.max_operations must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
