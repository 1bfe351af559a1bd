//! Generic retry engine with capped exponential backoff and jitter
//!
//! This module provides a flexible retry mechanism that can be used across the
//! application for any operation that might fail and needs retry logic. The
//! retry decision is delegated to a [`RetryPolicy`], which classifies each
//! error and may carry a server-supplied delay hint; the executor computes
//! backoff delays, applies symmetric jitter, and bounds the total number of
//! attempts.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All attempts were consumed without a success
    #[error("all {attempts} attempts exhausted: {source}")]
    Exhausted { attempts: u32, source: E },

    /// The operation failed with a non-retryable error
    #[error("operation failed with non-retryable error: {source}")]
    Aborted { source: E },

    /// The retry configuration is invalid
    #[error("invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// Consume the error and return the underlying operation error, if any.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } | Self::Aborted { source } => Some(source),
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation with the computed backoff delay
    Retry,
    /// Retry the operation after the given delay (server hint); jitter is
    /// still applied on top
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Classify the error for the given zero-based attempt index.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Configuration for retry behavior
///
/// The delay before attempt index `a` (zero-based, counted after the initial
/// failure) is `min(base_delay * 2^a, max_delay)` plus a uniformly random
/// jitter in `[-jitter, +jitter]`, floored at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts (initial try included)
    pub max_attempts: u32,
    /// First backoff delay
    pub base_delay: Duration,
    /// Cap applied to the exponential backoff
    pub max_delay: Duration,
    /// Half-width of the symmetric jitter interval
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(16_000),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RetryError<()>> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }
        if self.base_delay > self.max_delay {
            return Err(RetryError::InvalidConfiguration {
                message: format!(
                    "base_delay ({:?}) cannot be greater than max_delay ({:?})",
                    self.base_delay, self.max_delay
                ),
            });
        }
        Ok(())
    }

    /// Backoff delay for the given zero-based attempt index, before jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = base_ms.saturating_mul(factor).min(self.max_delay.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }

    /// Apply symmetric jitter to a delay, flooring the result at zero.
    fn jittered(&self, delay: Duration) -> Duration {
        let jitter_ms = self.jitter.as_millis() as i64;
        if jitter_ms == 0 {
            return delay;
        }
        let offset = rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);
        let delay_ms = (delay.as_millis() as i64 + offset).max(0);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Builder for [`RetryConfig`] with a fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Duration::ZERO;
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryError<()>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Outcome of a retry execution including the attempt count.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    /// Number of attempts performed (at least 1)
    pub attempts: u32,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }

    /// Number of retries performed after the initial attempt.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// The main retry executor
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and return attempt statistics.
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(err) = self.config.validate() {
            let message = match err {
                RetryError::InvalidConfiguration { message } => message,
                _ => "invalid retry configuration".to_string(),
            };
            return RetryOutcome {
                result: Err(RetryError::InvalidConfiguration { message }),
                attempts: 0,
            };
        }

        let mut attempt = 0u32;

        loop {
            let attempt_number = attempt + 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retries");
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt_number };
                }
                Err(error) => {
                    if attempt_number >= self.config.max_attempts {
                        warn!(
                            attempts = attempt_number,
                            error = %error,
                            "all retry attempts exhausted"
                        );
                        return RetryOutcome {
                            result: Err(RetryError::Exhausted {
                                attempts: attempt_number,
                                source: error,
                            }),
                            attempts: attempt_number,
                        };
                    }

                    let delay = match self.policy.should_retry(&error, attempt) {
                        RetryDecision::Stop => {
                            debug!(error = %error, "retry policy stopped retrying");
                            return RetryOutcome {
                                result: Err(RetryError::Aborted { source: error }),
                                attempts: attempt_number,
                            };
                        }
                        RetryDecision::Retry => {
                            self.config.jittered(self.config.backoff_delay(attempt))
                        }
                        RetryDecision::RetryAfter(hint) => self.config.jittered(hint),
                    };

                    warn!(
                        attempt = attempt_number,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "operation failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Convenience function to create a retry executor and execute an operation
pub async fn retry_with_policy<F, Fut, T, E, P>(
    config: RetryConfig,
    policy: P,
    operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryPolicy<E>,
    E: fmt::Display,
{
    RetryExecutor::new(config, policy).execute(operation).await
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::*;

    /// Always retry policy - retries on any error
    #[derive(Debug, Clone)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retry policy - never retries
    #[derive(Debug, Clone)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Predicate-based retry policy
    #[derive(Debug)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E, u32) -> bool,
    {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if (self.predicate)(error, attempt) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}
