//! Sliding-window rate limiting with a priority-fair waiting queue
//!
//! Admission control where the constraint is the count of admissions within
//! the last `window` duration, updated continuously rather than reset at
//! fixed epochs. Callers that cannot be admitted immediately are parked in a
//! priority-ordered queue (priority descending, enqueue order ascending) and
//! resumed by a single drain task as capacity frees up.
//!
//! The drain task serializes the pop-and-admit step, so a low-priority
//! late arrival can never overtake a queued high-priority waiter racing
//! through [`SlidingWindowLimiter::execute`].

use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};

/// Errors surfaced by the rate limiter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimiterError {
    /// The limiter was reset while the caller was queued for admission
    #[error("rate limiter was reset while waiting for admission")]
    Cancelled,

    /// The limiter configuration is invalid
    #[error("invalid rate limiter configuration: {0}")]
    InvalidConfiguration(String),
}

/// Configuration for the sliding-window limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowConfig {
    /// Maximum number of admissions per rolling window
    pub capacity: usize,
    /// Rolling window duration
    pub window: Duration,
}

impl SlidingWindowConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RateLimiterError> {
        if self.capacity == 0 {
            return Err(RateLimiterError::InvalidConfiguration(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(RateLimiterError::InvalidConfiguration(
                "window must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of the limiter state
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterSnapshot {
    /// Slots currently available in the window
    pub remaining: usize,
    /// Instant at which the oldest admission leaves the window (now if the
    /// window is empty)
    pub reset_at: Instant,
    /// Configured window capacity
    pub capacity: usize,
}

/// A parked caller awaiting admission.
///
/// Ordered by priority descending, then enqueue sequence ascending, so the
/// heap pops the highest-priority, earliest-enqueued waiter first.
struct Waiter {
    priority: i32,
    sequence: u64,
    admit: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct LimiterState {
    /// Admission timestamps, oldest first
    admissions: VecDeque<Instant>,
    waiters: BinaryHeap<Waiter>,
    /// Guards against spawning more than one drain task
    draining: bool,
    next_sequence: u64,
}

/// Sliding-window rate limiter with priority-fair queuing
///
/// At most `capacity` admissions are granted per rolling `window`. Excess
/// callers suspend until the drain task grants them a slot; suspended callers
/// resume in priority order with FIFO fairness at equal priority.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use syncline_common::resilience::SlidingWindowLimiter;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = SlidingWindowLimiter::new(100, Duration::from_secs(60))?;
///
/// let value = limiter.execute(0, || async { 2 + 2 }).await?;
/// assert_eq!(value, 4);
/// # Ok(())
/// # }
/// ```
pub struct SlidingWindowLimiter<C: Clock = SystemClock> {
    config: SlidingWindowConfig,
    state: Arc<Mutex<LimiterState>>,
    clock: Arc<C>,
}

impl SlidingWindowLimiter<SystemClock> {
    /// Create a new limiter with the system clock.
    pub fn new(capacity: usize, window: Duration) -> Result<Self, RateLimiterError> {
        Self::with_clock(capacity, window, SystemClock)
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    /// Create a new limiter with a custom clock.
    pub fn with_clock(
        capacity: usize,
        window: Duration,
        clock: C,
    ) -> Result<Self, RateLimiterError> {
        let config = SlidingWindowConfig { capacity, window };
        config.validate()?;

        Ok(Self {
            config,
            state: Arc::new(Mutex::new(LimiterState {
                admissions: VecDeque::with_capacity(capacity),
                waiters: BinaryHeap::new(),
                draining: false,
                next_sequence: 0,
            })),
            clock: Arc::new(clock),
        })
    }

    /// Execute `work` under a rate-limit slot.
    ///
    /// If the window admits immediately, the admission timestamp is recorded
    /// and `work` runs inline. Otherwise the caller is enqueued with the
    /// given priority and suspends until the drain task grants it a slot.
    ///
    /// The slot is consumed by the attempt regardless of whether `work`
    /// succeeds; failures inside `work` belong to the caller's own result
    /// type.
    ///
    /// # Errors
    /// Returns [`RateLimiterError::Cancelled`] if [`reset`](Self::reset) is
    /// called while the caller is still queued.
    pub async fn execute<F, Fut, T>(&self, priority: i32, work: F) -> Result<T, RateLimiterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let waiting = {
            let mut state = self.lock_state();
            let now = self.clock.now();
            Self::prune(&mut state, now, self.config.window);

            // Inline admission requires an empty waiter queue; otherwise a
            // late arrival could overtake a queued higher-priority waiter
            // between drain wake-ups.
            if state.waiters.is_empty() && state.admissions.len() < self.config.capacity {
                state.admissions.push_back(now);
                None
            } else {
                let (tx, rx) = oneshot::channel();
                let sequence = state.next_sequence;
                state.next_sequence += 1;
                state.waiters.push(Waiter { priority, sequence, admit: tx });
                debug!(priority, sequence, "window saturated, caller queued");
                self.ensure_drain(&mut state);
                Some(rx)
            }
        };

        if let Some(rx) = waiting {
            rx.await.map_err(|_| RateLimiterError::Cancelled)?;
        }

        Ok(work().await)
    }

    /// Whether a request would be admitted right now.
    pub fn can_admit_now(&self) -> bool {
        let mut state = self.lock_state();
        let now = self.clock.now();
        Self::prune(&mut state, now, self.config.window);
        state.admissions.len() < self.config.capacity
    }

    /// Point-in-time view of remaining slots and the next window reset.
    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let mut state = self.lock_state();
        let now = self.clock.now();
        Self::prune(&mut state, now, self.config.window);

        let remaining = self.config.capacity - state.admissions.len();
        let reset_at = match state.admissions.front() {
            Some(&oldest) => oldest + self.config.window,
            None => now,
        };

        RateLimiterSnapshot { remaining, reset_at, capacity: self.config.capacity }
    }

    /// Number of callers currently queued for admission.
    pub fn queue_depth(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// Suspend until at least one slot is available.
    ///
    /// A no-op when the pruned window already has capacity.
    pub async fn wait_for_reset(&self) {
        loop {
            let wake_in = {
                let mut state = self.lock_state();
                let now = self.clock.now();
                Self::prune(&mut state, now, self.config.window);

                if state.admissions.len() < self.config.capacity {
                    return;
                }

                // Window is full, so an oldest admission exists.
                let oldest = *state.admissions.front().expect("full window has admissions");
                (oldest + self.config.window).saturating_duration_since(now)
            };

            tokio::time::sleep(wake_in.max(Duration::from_millis(1))).await;
        }
    }

    /// Drop all limiter state, including queued waiters' claims.
    ///
    /// Queued callers receive [`RateLimiterError::Cancelled`].
    pub fn reset(&self) {
        let mut state = self.lock_state();
        let cancelled = state.waiters.len();
        state.admissions.clear();
        // Dropping the senders resolves every parked receiver with an error.
        state.waiters.clear();

        if cancelled > 0 {
            warn!(cancelled, "rate limiter reset cancelled queued waiters");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LimiterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("rate limiter state lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    /// Drop admission timestamps that have left the rolling window.
    fn prune(state: &mut LimiterState, now: Instant, window: Duration) {
        while let Some(&oldest) = state.admissions.front() {
            if now.duration_since(oldest) >= window {
                state.admissions.pop_front();
            } else {
                break;
            }
        }
    }

    /// Spawn the drain task if it is not already running.
    ///
    /// Must be called with the state lock held; the `draining` flag is the
    /// re-entry guard.
    fn ensure_drain(&self, state: &mut LimiterState) {
        if state.draining {
            return;
        }
        state.draining = true;

        let shared = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let config = self.config;
        tokio::spawn(async move {
            Self::drain(shared, clock, config).await;
        });
    }

    /// Queue-processing loop.
    ///
    /// Runs while waiters exist: admits the highest-priority waiter whenever
    /// the pruned window has capacity, otherwise sleeps until the oldest
    /// admission expires. Popping and recording the admission happen under
    /// one lock acquisition, which makes the priority decision atomic with
    /// the slot accounting.
    async fn drain(state: Arc<Mutex<LimiterState>>, clock: Arc<C>, config: SlidingWindowConfig) {
        enum Step {
            Admit(oneshot::Sender<()>),
            Sleep(Duration),
            Done,
        }

        loop {
            let step = {
                let mut guard = match state.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => {
                        warn!("rate limiter state lock poisoned in drain");
                        poisoned.into_inner()
                    }
                };
                let now = clock.now();
                Self::prune(&mut guard, now, config.window);

                if guard.waiters.is_empty() {
                    guard.draining = false;
                    Step::Done
                } else if guard.admissions.len() < config.capacity {
                    let waiter = guard.waiters.pop().expect("non-empty waiter heap");
                    guard.admissions.push_back(now);
                    debug!(
                        priority = waiter.priority,
                        sequence = waiter.sequence,
                        "admitting queued waiter"
                    );
                    Step::Admit(waiter.admit)
                } else {
                    let oldest = *guard.admissions.front().expect("full window has admissions");
                    let wake_in = (oldest + config.window).saturating_duration_since(now);
                    Step::Sleep(wake_in.max(Duration::from_millis(1)))
                }
            };

            match step {
                Step::Done => return,
                Step::Admit(tx) => {
                    if tx.send(()).is_err() {
                        // The waiter vanished before admission; return the
                        // slot so the count stays accurate.
                        let mut guard = match state.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        guard.admissions.pop_back();
                    }
                }
                Step::Sleep(wake_in) => tokio::time::sleep(wake_in).await,
            }
        }
    }
}

impl<C: Clock> Clone for SlidingWindowLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}
