//! Request pipeline
//!
//! Every typed call runs inside the retry engine; each attempt acquires a
//! rate-limit slot, obtains a current token, issues the transport call under
//! a per-call deadline, and classifies the outcome. A 401 invalidates the
//! credential so the next attempt acquires fresh.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use syncline_common::resilience::{
    RateLimiterError, RetryConfig, RetryExecutor, SlidingWindowLimiter,
};

use crate::auth::CredentialManager;
use crate::error::{SyncError, SyncRetryPolicy};
use crate::transport::{HttpMethod, Transport, TransportRequest, TransportResponse};

use super::{error_body_excerpt, parse_retry_after};

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// API base URL, e.g. `https://api.example.com`
    pub base_url: String,
    /// Default per-call deadline for the transport call
    pub timeout: Duration,
    /// Retry policy applied around each typed call
    pub retry: RetryConfig,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_millis(5000),
            retry: RetryConfig::default(),
        }
    }
}

/// Per-call options for the lower-level client surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Rate-limiter priority; higher values are admitted first when queued
    pub priority: i32,
    /// Per-call deadline override; falls back to the client default
    pub timeout: Option<Duration>,
}

/// Result of a typed call plus the retries it consumed.
#[derive(Debug)]
pub struct CallOutcome<T> {
    pub value: Result<T, SyncError>,
    pub retries: u32,
}

/// Typed API client composing retry, rate limiting, and credentials
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialManager>,
    limiter: Arc<SlidingWindowLimiter>,
    config: ApiClientConfig,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialManager>,
        limiter: Arc<SlidingWindowLimiter>,
        config: ApiClientConfig,
    ) -> Self {
        Self { transport, credentials, limiter, config }
    }

    /// Execute a GET request.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        self.request_with_outcome(HttpMethod::Get, path, None::<&()>, RequestOptions::default())
            .await
            .value
    }

    /// Execute a POST request with an optional JSON body.
    pub async fn post<T, B>(&self, path: &str, body: Option<&B>) -> Result<T, SyncError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_with_outcome(HttpMethod::Post, path, body, RequestOptions::default())
            .await
            .value
    }

    /// Execute a PUT request with an optional JSON body.
    pub async fn put<T, B>(&self, path: &str, body: Option<&B>) -> Result<T, SyncError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request_with_outcome(HttpMethod::Put, path, body, RequestOptions::default())
            .await
            .value
    }

    /// Execute a DELETE request.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        self.request_with_outcome(HttpMethod::Delete, path, None::<&()>, RequestOptions::default())
            .await
            .value
    }

    /// Execute a request through the full pipeline and report the retries it
    /// consumed.
    pub async fn request_with_outcome<T, B>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> CallOutcome<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body_json = match body.map(serde_json::to_string).transpose() {
            Ok(serialized) => serialized,
            Err(e) => {
                return CallOutcome {
                    value: Err(SyncError::Validation(format!(
                        "failed to serialize request body: {e}"
                    ))),
                    retries: 0,
                }
            }
        };

        debug!(%method, path, "api call");

        let executor = RetryExecutor::new(self.config.retry.clone(), SyncRetryPolicy);
        let outcome = executor
            .execute_with_outcome(|| {
                let body_json = body_json.clone();
                async move { self.attempt::<T>(method, path, body_json, options).await }
            })
            .await;

        let retries = outcome.retries();
        CallOutcome { value: outcome.result.map_err(SyncError::from), retries }
    }

    /// One pipeline attempt: slot, token, headers, deadline, classification.
    async fn attempt<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
        options: RequestOptions,
    ) -> Result<T, SyncError> {
        let executed = self
            .limiter
            .execute(options.priority, || async move {
                let token = self.credentials.obtain().await?;

                let url =
                    format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
                let mut request = TransportRequest::new(method, url)
                    .with_header("Authorization", token.authorization_value())
                    .with_header("Content-Type", "application/json");
                if let Some(body) = body {
                    request = request.with_body(body);
                }

                let deadline = options.timeout.unwrap_or(self.config.timeout);
                let response =
                    match tokio::time::timeout(deadline, self.transport.send(request)).await {
                        Ok(sent) => sent?,
                        Err(_) => {
                            return Err(SyncError::Timeout {
                                operation: format!("{method} {path}"),
                                duration: deadline,
                            })
                        }
                    };

                classify_response::<T>(&response)
            })
            .await;

        let result = match executed {
            Ok(inner) => inner,
            Err(RateLimiterError::Cancelled) => Err(SyncError::Cancelled),
            Err(other) => Err(SyncError::Internal(other.to_string())),
        };

        // A rejected credential is stale; drop it so the next attempt's
        // obtain() performs a fresh login.
        if matches!(result, Err(SyncError::CredentialExpired)) {
            self.credentials.invalidate();
        }

        result
    }
}

/// Map a transport response onto the error taxonomy, decoding 2xx bodies.
pub fn classify_response<T: DeserializeOwned>(
    response: &TransportResponse,
) -> Result<T, SyncError> {
    match response.status {
        _ if response.is_success() => response.json(),
        401 => Err(SyncError::CredentialExpired),
        429 => Err(SyncError::RateLimited {
            retry_after_secs: parse_retry_after(response.header("retry-after")),
        }),
        503 => Err(SyncError::ServiceUnavailable {
            retry_after_secs: response
                .header("retry-after")
                .map(|value| parse_retry_after(Some(value))),
        }),
        status => Err(SyncError::ApiFailure {
            status,
            message: error_body_excerpt(&response.body),
        }),
    }
}
