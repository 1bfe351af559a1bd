//! Resilience patterns for fault-tolerant access to remote resources
//!
//! This module provides **generic, reusable** resilience patterns:
//! - **Retry Logic**: classification-driven retries with capped exponential
//!   backoff, symmetric jitter, and server-supplied delay hints
//! - **Rate Limiting**: sliding-window admission control with a
//!   priority-fair waiting queue
//!
//! Both patterns are generic over the caller's error type and are backed by a
//! [`Clock`](clock::Clock) abstraction so time-dependent behavior can be
//! tested deterministically.
//!
//! # Examples
//!
//! ## Retrying an operation
//!
//! ```rust
//! use syncline_common::resilience::retry::{policies, RetryConfig, RetryExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetryConfig::builder().max_attempts(3).build().unwrap();
//! let executor = RetryExecutor::new(config, policies::AlwaysRetry);
//!
//! let value = executor.execute(|| async { Ok::<_, std::io::Error>(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```
//!
//! ## Rate-limited execution
//!
//! ```rust
//! use std::time::Duration;
//!
//! use syncline_common::resilience::rate_limiter::SlidingWindowLimiter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = SlidingWindowLimiter::new(10, Duration::from_secs(60))?;
//!
//! let body = limiter.execute(0, || async { "admitted" }).await?;
//! assert_eq!(body, "admitted");
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod rate_limiter;
pub mod retry;

pub use clock::{Clock, MockClock, SystemClock};
pub use rate_limiter::{
    RateLimiterError, RateLimiterSnapshot, SlidingWindowConfig, SlidingWindowLimiter,
};
pub use retry::{
    policies, retry_with_policy, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy,
};
