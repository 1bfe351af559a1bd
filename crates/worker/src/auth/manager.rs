//! Credential manager with single-flight refresh
//!
//! Produces a currently-valid token on demand. Whatever the number of
//! concurrent callers, at most one login request is in flight against the
//! auth endpoint: the first caller to notice a refresh is needed installs a
//! shared future, and everyone else awaits the same future. A failed refresh
//! never clobbers a still-valid token.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{debug, info, warn};

use syncline_common::resilience::{RetryConfig, RetryExecutor};

use crate::error::{SyncError, SyncRetryPolicy};
use crate::transport::{HttpMethod, Transport, TransportRequest, TransportResponse};

use super::types::{AccessToken, LoginResponse};

type RefreshFuture = Shared<BoxFuture<'static, Result<AccessToken, SyncError>>>;

/// Configuration for credential acquisition
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// API base URL, e.g. `https://api.example.com`
    pub base_url: String,
    /// Login identity (account email)
    pub email: String,
    /// Login secret
    pub password: String,
    /// Retry policy for the login call
    pub retry: RetryConfig,
}

impl AuthConfig {
    /// Create a config with the tightened acquisition retry policy:
    /// 3 attempts, base 1000 ms, max 5000 ms, jitter 250 ms.
    #[must_use]
    pub fn new(base_url: String, email: String, password: String) -> Self {
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            jitter: Duration::from_millis(250),
        };
        Self { base_url, email, password, retry }
    }

    fn login_url(&self) -> String {
        format!("{}/auth/login", self.base_url.trim_end_matches('/'))
    }
}

struct CredentialState {
    token: Option<AccessToken>,
    /// The in-flight refresh, tagged with a generation so late finishers
    /// never clear a newer refresh's slot.
    refresh: Option<(u64, RefreshFuture)>,
    next_generation: u64,
}

/// Thread-safe credential manager with single-flight refresh
pub struct CredentialManager {
    transport: Arc<dyn Transport>,
    config: AuthConfig,
    state: Mutex<CredentialState>,
}

impl CredentialManager {
    pub fn new(transport: Arc<dyn Transport>, config: AuthConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(CredentialState {
                token: None,
                refresh: None,
                next_generation: 0,
            }),
        }
    }

    /// Get a valid token, refreshing first if the current one is missing or
    /// inside the refresh buffer.
    ///
    /// # Errors
    /// Returns `AuthenticationFailed` when the endpoint rejects the
    /// configured credentials, or a network-class error when the endpoint is
    /// unreachable after the acquisition retry budget.
    pub async fn obtain(&self) -> Result<AccessToken, SyncError> {
        let pending = {
            let mut state = self.lock_state();
            if let Some(token) = state.token.as_ref() {
                if !token.needs_refresh() {
                    return Ok(token.clone());
                }
                debug!(
                    remaining_secs = token.seconds_until_expiry(),
                    "token entered refresh buffer"
                );
            }
            self.join_or_start_refresh(&mut state)
        };

        self.settle(pending).await
    }

    /// Force a refresh, coalescing with any in-flight refresh.
    pub async fn refresh(&self) -> Result<AccessToken, SyncError> {
        let pending = {
            let mut state = self.lock_state();
            self.join_or_start_refresh(&mut state)
        };

        self.settle(pending).await
    }

    /// Discard the current token; the next `obtain` acquires fresh.
    pub fn invalidate(&self) {
        let mut state = self.lock_state();
        if state.token.take().is_some() {
            debug!("credential invalidated");
        }
    }

    /// Absolute expiry instant of the current token, if any.
    pub fn expiry_instant(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.lock_state().token.as_ref().map(AccessToken::expires_at)
    }

    /// Seconds until the current token expires, if any.
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.lock_state().token.as_ref().map(AccessToken::seconds_until_expiry)
    }

    /// The current token without triggering acquisition.
    pub fn current_token(&self) -> Option<AccessToken> {
        self.lock_state().token.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, CredentialState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("credential state lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    /// Join the in-flight refresh or install a new one. Must be called with
    /// the state lock held; at most one refresh is ever live.
    fn join_or_start_refresh(&self, state: &mut CredentialState) -> (u64, RefreshFuture) {
        if let Some((generation, future)) = state.refresh.as_ref() {
            debug!(generation, "joining in-flight credential refresh");
            return (*generation, future.clone());
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        let future: RefreshFuture =
            async move { Self::login(transport, config).await }.boxed().shared();

        debug!(generation, "starting credential refresh");
        state.refresh = Some((generation, future.clone()));
        (generation, future)
    }

    /// Await the shared refresh and publish its outcome.
    ///
    /// Whichever caller settles first clears the slot; on success the new
    /// token replaces the current one. On failure only the slot is cleared,
    /// leaving any existing non-expired token usable.
    async fn settle(
        &self,
        (generation, future): (u64, RefreshFuture),
    ) -> Result<AccessToken, SyncError> {
        let result = future.await;

        let mut state = self.lock_state();
        if state.refresh.as_ref().map(|(g, _)| *g) == Some(generation) {
            state.refresh = None;
            match &result {
                Ok(token) => {
                    info!(
                        expires_in = token.expires_in,
                        "credential refresh succeeded"
                    );
                    state.token = Some(token.clone());
                }
                Err(error) => {
                    warn!(error = %error, "credential refresh failed");
                }
            }
        }

        result
    }

    /// Perform the login call under the tightened acquisition retry policy.
    async fn login(
        transport: Arc<dyn Transport>,
        config: AuthConfig,
    ) -> Result<AccessToken, SyncError> {
        let executor = RetryExecutor::new(config.retry.clone(), SyncRetryPolicy);
        executor
            .execute(|| {
                let transport = Arc::clone(&transport);
                let config = config.clone();
                async move { Self::login_once(transport.as_ref(), &config).await }
            })
            .await
            .map_err(SyncError::from)
    }

    /// Single login attempt against `POST <base>/auth/login`.
    async fn login_once(
        transport: &dyn Transport,
        config: &AuthConfig,
    ) -> Result<AccessToken, SyncError> {
        let credentials = BASE64.encode(format!("{}:{}", config.email, config.password));
        let request = TransportRequest::new(HttpMethod::Post, config.login_url())
            .with_header("Authorization", format!("Basic {credentials}"))
            .with_header("Content-Type", "application/json")
            .with_body("{}");

        let response = transport.send(request).await?;
        if response.is_success() {
            let login: LoginResponse = response.json()?;
            return Ok(login.into());
        }

        Err(Self::classify_login_failure(&response))
    }

    /// Map a non-2xx login response onto the taxonomy.
    ///
    /// 401 is retryable during acquisition; other 4xx are credential
    /// rejections and final. 429/503 carry the upstream's hint.
    fn classify_login_failure(response: &TransportResponse) -> SyncError {
        let excerpt = crate::api::error_body_excerpt(&response.body);
        match response.status {
            401 => SyncError::AuthenticationFailed {
                message: format!("auth endpoint returned 401: {excerpt}"),
                retryable: true,
            },
            429 => SyncError::RateLimited {
                retry_after_secs: crate::api::parse_retry_after(response.header("retry-after")),
            },
            503 => SyncError::ServiceUnavailable {
                retry_after_secs: response
                    .header("retry-after")
                    .map(|v| crate::api::parse_retry_after(Some(v))),
            },
            status if (400..500).contains(&status) => SyncError::AuthenticationFailed {
                message: format!("auth endpoint returned {status}: {excerpt}"),
                retryable: false,
            },
            status => {
                debug!(status, "auth endpoint returned server error");
                SyncError::ServiceUnavailable { retry_after_secs: None }
            }
        }
    }
}
