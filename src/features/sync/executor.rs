//! Remote executor: replays one queued operation against the API.
//!
//! The executor is stateless and never retries; it only classifies the
//! outcome. Retry policy lives in the orchestrator.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::operation::{Failure, OperationKind, QueuedOperation};
use crate::config::ApiConfig;
use crate::error::{FintrackError, Result};

/// Header carrying the operation id so replays can be deduplicated remotely.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Longest response body excerpt kept in a failure reason.
const MAX_REASON_BODY: usize = 200;

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// The remote mutation was applied.
    Success,
    /// Transient condition; a later pass may succeed.
    RetryableFailure(String),
    /// The operation can never succeed as stored.
    TerminalFailure(String),
}

impl Outcome {
    /// The failure to record, if this outcome is one.
    #[must_use]
    pub fn into_failure(self) -> Option<Failure> {
        match self {
            Self::Success => None,
            Self::RetryableFailure(reason) => Some(Failure::retryable(reason)),
            Self::TerminalFailure(reason) => Some(Failure::terminal(reason)),
        }
    }
}

/// Applies a single operation remotely.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, operation: &QueuedOperation) -> Outcome;
}

/// Classify a non-success HTTP status.
///
/// 408, 429 and 5xx are transient. 401/403 are retryable too: the host may
/// refresh credentials between passes. Every other 4xx is terminal.
#[must_use]
pub fn classify_status(status: u16, reason: String) -> Outcome {
    match status {
        200..=299 => Outcome::Success,
        401 | 403 | 408 | 429 | 500..=599 => Outcome::RetryableFailure(reason),
        _ => Outcome::TerminalFailure(reason),
    }
}

/// HTTP implementation over the host's CRUD API.
pub struct HttpExecutor {
    client: Client,
    api: ApiConfig,
}

impl HttpExecutor {
    /// Create an executor for the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api: ApiConfig) -> Result<Self> {
        let client = Client::builder().timeout(api.request_timeout()).build()?;
        Ok(Self { client, api })
    }

    /// Build the request for an operation.
    ///
    /// Payload problems are `InvalidPayload`: no amount of retrying fixes them.
    fn request_for(&self, operation: &QueuedOperation) -> Result<RequestBuilder> {
        let body: serde_json::Value = serde_json::from_str(&operation.payload).map_err(|e| {
            FintrackError::InvalidPayload(format!("payload is not valid JSON: {e}"))
        })?;

        let route = self.api.route_for(&operation.target_entity);
        let (method, path) = match operation.kind {
            OperationKind::Create => (Method::POST, route),
            OperationKind::BulkRename => (Method::POST, format!("{route}/bulk-rename")),
            OperationKind::Update | OperationKind::Delete => {
                let record = operation.record_id().ok_or_else(|| {
                    FintrackError::InvalidPayload(format!(
                        "{} requires an \"id\" field in the payload",
                        operation.kind.as_str()
                    ))
                })?;
                let method = if operation.kind == OperationKind::Update {
                    Method::PUT
                } else {
                    Method::DELETE
                };
                (method, format!("{route}/{record}"))
            }
        };

        let mut request = self
            .client
            .request(method, self.api.url(&path))
            .header(IDEMPOTENCY_HEADER, &operation.id);
        if let Some(token) = &self.api.token {
            request = request.bearer_auth(token);
        }
        if operation.kind != OperationKind::Delete {
            request = request.json(&body);
        }
        Ok(request)
    }
}

#[async_trait]
impl RemoteExecutor for HttpExecutor {
    async fn execute(&self, operation: &QueuedOperation) -> Outcome {
        let request = match self.request_for(operation) {
            Ok(request) => request,
            Err(e) => return Outcome::TerminalFailure(e.to_string()),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Outcome::TerminalFailure(e.to_string()),
            Err(e) => return Outcome::RetryableFailure(format!("request failed: {e}")),
        };

        let status = response.status();
        debug!(id = %operation.id, status = status.as_u16(), "remote responded");
        if status.is_success() {
            return Outcome::Success;
        }

        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.trim().chars().take(MAX_REASON_BODY).collect();
        let reason = if excerpt.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            format!("HTTP {}: {excerpt}", status.as_u16())
        };
        classify_status(status.as_u16(), reason)
    }
}
