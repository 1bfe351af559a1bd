//! Reusable concurrency and resilience building blocks shared across
//! Syncline crates.
//!
//! The crate is deliberately free of any domain knowledge: every type here is
//! generic over the caller's error and payload types so the same primitives
//! can guard an HTTP client, a database writer, or anything else that needs
//! bounded, fair, retryable access to a contended resource.
//!
//! - [`resilience`]: retry engine with capped exponential backoff and
//!   server-hint overrides, plus a sliding-window rate limiter with a
//!   priority-fair waiting queue.
//! - [`queue`]: a priority-fair bounded-parallelism task executor.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod queue;
pub mod resilience;

pub use queue::{QueueError, QueueStats, TaskError, TaskHandle, TaskQueue};
pub use resilience::clock::{Clock, MockClock, SystemClock};
pub use resilience::rate_limiter::{
    RateLimiterError, RateLimiterSnapshot, SlidingWindowConfig, SlidingWindowLimiter,
};
pub use resilience::retry::{
    policies, retry_with_policy, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy,
};
