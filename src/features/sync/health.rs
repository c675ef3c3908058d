//! Remote liveness reporting.
//!
//! Distinct from raw connectivity: the network may be up while the API is
//! down. Health never gates enqueueing; the orchestrator only uses it to
//! skip automatic passes against a known-down remote.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::Result;

/// Outcome of one liveness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// A cached liveness result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Whether the check is younger than `max_age`.
    #[must_use]
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        chrono::Duration::from_std(max_age)
            .map_or(true, |max_age| Utc::now() - self.checked_at <= max_age)
    }
}

/// Something that can tell whether the remote is alive.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self) -> HealthStatus;
}

/// Calls `{base_url}{health_path}`; any 2xx is healthy.
pub struct HttpLivenessProbe {
    client: Client,
    url: String,
}

impl HttpLivenessProbe {
    /// Create a probe for the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = Client::builder().timeout(api.request_timeout()).build()?;
        Ok(Self {
            client,
            url: api.url(&api.health_path),
        })
    }
}

#[async_trait]
impl LivenessProbe for HttpLivenessProbe {
    async fn probe(&self) -> HealthStatus {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) => HealthStatus::Unhealthy(format!("HTTP {}", response.status().as_u16())),
            Err(e) => HealthStatus::Unhealthy(format!("no response: {e}")),
        }
    }
}

/// Runs liveness checks and caches the latest result.
pub struct HealthReporter {
    probe: Arc<dyn LivenessProbe>,
    stale_after: Duration,
    latest: RwLock<Option<HealthReport>>,
}

impl HealthReporter {
    pub fn new(probe: Arc<dyn LivenessProbe>, stale_after: Duration) -> Self {
        Self {
            probe,
            stale_after,
            latest: RwLock::new(None),
        }
    }

    /// Probe the remote now and cache the result.
    pub async fn check_health(&self) -> HealthReport {
        let report = HealthReport {
            status: self.probe.probe().await,
            checked_at: Utc::now(),
        };

        let previous = self.latest();
        match (&previous.map(|r| r.status), &report.status) {
            (Some(HealthStatus::Healthy) | None, HealthStatus::Unhealthy(reason)) => {
                warn!(%reason, "remote is unhealthy");
            }
            (Some(HealthStatus::Unhealthy(_)), HealthStatus::Healthy) => {
                info!("remote is healthy again");
            }
            _ => {}
        }

        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(report.clone());
        }
        report
    }

    /// The most recent check, if any has run.
    #[must_use]
    pub fn latest(&self) -> Option<HealthReport> {
        self.latest.read().ok().and_then(|latest| latest.clone())
    }

    /// Whether the most recent check is recent enough to act on.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.latest()
            .is_some_and(|report| report.is_fresh(self.stale_after))
    }

    /// Whether the most recent check says the remote is down.
    #[must_use]
    pub fn known_unhealthy(&self) -> bool {
        self.latest()
            .is_some_and(|report| !report.status.is_healthy())
    }
}
