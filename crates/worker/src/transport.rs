//! Injectable HTTP transport
//!
//! The pipeline never talks to an HTTP stack directly; it goes through the
//! [`Transport`] trait so tests can script responses without a network. The
//! only concrete implementation shipped here is [`ReqwestTransport`].

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::SyncError;

/// HTTP methods exposed by the typed client surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound request as seen by the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl TransportRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: Vec::new(), body: None }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Look up a request header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response as seen by the pipeline's classifier.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    headers: HashMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    /// Build a response; header names are stored lowercased so lookup is
    /// case-insensitive.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<String>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self { status, headers, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        serde_json::from_str(&self.body)
            .map_err(|e| SyncError::Validation(format!("failed to decode response body: {e}")))
    }
}

/// The injectable request/response function the pipeline is built on.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, SyncError>;
}

/// Message fragments that identify transport-level connectivity failures.
const NETWORK_FAILURE_SIGNATURES: &[&str] =
    &["econnrefused", "enotfound", "etimedout", "fetch failed", "network"];

/// Whether an error message looks like a connectivity failure.
fn matches_network_signature(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    NETWORK_FAILURE_SIGNATURES.iter().any(|sig| lowered.contains(sig))
}

/// Production transport backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport with the given request timeout.
    ///
    /// # Errors
    /// Returns `SyncError::Config` if the underlying client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { client, timeout })
    }

    fn classify_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            return SyncError::Timeout {
                operation: "http request".to_string(),
                duration: self.timeout,
            };
        }
        let message = err.to_string();
        if err.is_connect() || matches_network_signature(&message) {
            return SyncError::NetworkFailure { message };
        }
        // Anything else (builder misuse, body streaming, redirect policy)
        // surfaces as-is and is not retried.
        SyncError::Internal(message)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, SyncError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| self.classify_error(e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| self.classify_error(e))?;

        Ok(TransportResponse::new(status, headers, body))
    }
}
