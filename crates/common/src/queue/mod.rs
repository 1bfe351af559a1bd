//! Priority-fair bounded-parallelism task executor
//!
//! Runs arbitrary fallible tasks with at most `max_parallel` executing
//! concurrently. The backlog is ordered by priority descending with FIFO
//! fairness at equal priority; the scheduler starts tasks on every submit and
//! on every completion. Starts are ordered, completions are not: a
//! lower-priority task that started earlier may finish after a
//! higher-priority one that started later.
//!
//! A task's failure is isolated: the queue records it, delivers the error
//! through the task's [`TaskHandle`], and keeps running siblings.

use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Poll interval for [`TaskQueue::await_idle`].
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors surfaced by queue construction
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue configuration is invalid
    #[error("invalid queue configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors surfaced by a [`TaskHandle`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError<E> {
    /// The task ran and failed with the work's own error
    #[error("task failed: {source}")]
    Failed { source: E },

    /// The task was purged from the backlog before it started
    #[error("task was cancelled before completion")]
    Cancelled,
}

/// Counters and gauges describing queue activity.
///
/// `pending` and `active` are gauges; `completed` and `failed` increase
/// monotonically over the queue's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Type-erased task body. Resolves to `true` when the task failed.
type TaskFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// A backlog entry: ordered by priority descending, then submit sequence
/// ascending.
struct QueuedTask {
    priority: i32,
    sequence: u64,
    body: TaskFuture,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct QueueState {
    backlog: BinaryHeap<QueuedTask>,
    active: usize,
    completed: u64,
    failed: u64,
    next_sequence: u64,
}

struct QueueInner {
    state: Mutex<QueueState>,
    max_parallel: usize,
}

impl QueueInner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("task queue state lock poisoned");
                poisoned.into_inner()
            }
        }
    }
}

/// Completion handle for a submitted task.
///
/// Resolves with the task's own result once it runs, or with
/// [`TaskError::Cancelled`] if the task was purged before starting.
pub struct TaskHandle<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> TaskHandle<T, E> {
    /// Await the task's completion.
    pub async fn join(self) -> Result<T, TaskError<E>> {
        match self.receiver.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(TaskError::Failed { source }),
            Err(_) => Err(TaskError::Cancelled),
        }
    }
}

/// Priority-fair bounded-parallelism executor
///
/// # Examples
///
/// ```rust
/// use syncline_common::queue::TaskQueue;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = TaskQueue::new(4)?;
///
/// let handle = queue.submit(0, async { Ok::<_, std::io::Error>(21 * 2) }).await;
/// assert_eq!(handle.join().await.unwrap(), 42);
/// # Ok(())
/// # }
/// ```
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    /// Create a new queue running at most `max_parallel` tasks concurrently.
    ///
    /// # Errors
    /// Returns [`QueueError::InvalidConfiguration`] when `max_parallel` is 0.
    pub fn new(max_parallel: usize) -> Result<Self, QueueError> {
        if max_parallel == 0 {
            return Err(QueueError::InvalidConfiguration(
                "max_parallel must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    backlog: BinaryHeap::new(),
                    active: 0,
                    completed: 0,
                    failed: 0,
                    next_sequence: 0,
                }),
                max_parallel,
            }),
        })
    }

    /// Submit a task; the returned handle completes with the task's result.
    ///
    /// Must be called from within a Tokio runtime: admitted tasks are spawned
    /// onto it.
    pub async fn submit<T, E, F>(&self, priority: i32, work: F) -> TaskHandle<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let body: TaskFuture = Box::pin(async move {
            let result = work.await;
            let failed = result.is_err();
            // The submitter may have dropped its handle; the completion still
            // counts either way.
            let _ = tx.send(result);
            failed
        });

        {
            let mut state = self.inner.lock_state();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.backlog.push(QueuedTask { priority, sequence, body });
        }

        Self::schedule(&self.inner);
        TaskHandle { receiver: rx }
    }

    /// Submit a batch of tasks at the same priority.
    pub async fn submit_all<T, E, F, I>(&self, priority: i32, works: I) -> Vec<TaskHandle<T, E>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut handles = Vec::new();
        for work in works {
            handles.push(self.submit(priority, work).await);
        }
        handles
    }

    /// Current queue statistics.
    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock_state();
        QueueStats {
            pending: state.backlog.len(),
            active: state.active,
            completed: state.completed,
            failed: state.failed,
        }
    }

    /// Number of tasks waiting in the backlog.
    pub fn pending_depth(&self) -> usize {
        self.inner.lock_state().backlog.len()
    }

    /// Number of tasks currently running.
    pub fn active_count(&self) -> usize {
        self.inner.lock_state().active
    }

    /// Whether the queue has neither running nor pending tasks.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock_state();
        state.active == 0 && state.backlog.is_empty()
    }

    /// Suspend until the queue is idle, polling at a bounded 100 ms interval.
    pub async fn await_idle(&self) {
        loop {
            if self.is_idle() {
                return;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Drop every pending (unstarted) task from the backlog.
    ///
    /// In-flight tasks are untouched. Purged submitters observe
    /// [`TaskError::Cancelled`] on their handles. Returns the number of
    /// purged tasks.
    pub fn purge(&self) -> usize {
        let mut state = self.inner.lock_state();
        let purged = state.backlog.len();
        // Dropping the backlog drops each task's completion sender.
        state.backlog.clear();

        if purged > 0 {
            warn!(purged, "purged pending tasks from queue backlog");
        }
        purged
    }

    /// Start backlog tasks while free slots exist.
    ///
    /// Invoked on every submit and every completion, so the
    /// `active <= max_parallel` invariant holds at all times.
    fn schedule(inner: &Arc<QueueInner>) {
        loop {
            let task = {
                let mut state = inner.lock_state();
                if state.active >= inner.max_parallel {
                    return;
                }
                match state.backlog.pop() {
                    Some(task) => {
                        state.active += 1;
                        task
                    }
                    None => return,
                }
            };

            debug!(priority = task.priority, sequence = task.sequence, "starting queued task");

            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let failed = task.body.await;
                {
                    let mut state = inner.lock_state();
                    state.active -= 1;
                    if failed {
                        state.failed += 1;
                    } else {
                        state.completed += 1;
                    }
                }
                Self::schedule(&inner);
            });
        }
    }
}

impl Clone for TaskQueue {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for queue construction and accounting. Scheduling order and
    //! parallelism bounds are covered by the crate's integration tests.

    use super::*;

    /// Validates `TaskQueue::new` behavior for the construction invariant
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures `max_parallel = 0` is rejected at construction.
    /// - Ensures `max_parallel = 1` is accepted.
    #[test]
    fn rejects_zero_parallelism() {
        assert!(matches!(TaskQueue::new(0), Err(QueueError::InvalidConfiguration(_))));
        assert!(TaskQueue::new(1).is_ok());
    }

    /// Validates `TaskQueue::stats` behavior for the fresh queue scenario.
    ///
    /// Assertions:
    /// - Confirms all counters and gauges start at zero.
    #[test]
    fn fresh_queue_has_zeroed_stats() {
        let queue = TaskQueue::new(2).unwrap();
        assert_eq!(queue.stats(), QueueStats::default());
        assert!(queue.is_idle());
    }

    /// Validates `TaskQueue::submit` behavior for the round-trip scenario.
    ///
    /// Assertions:
    /// - Confirms the handle resolves with exactly the work's return value.
    #[tokio::test]
    async fn submit_round_trips_return_value() {
        let queue = TaskQueue::new(2).unwrap();

        let handle = queue.submit(0, async { Ok::<_, String>("payload") }).await;
        assert_eq!(handle.join().await.unwrap(), "payload");

        queue.await_idle().await;
        assert_eq!(queue.stats().completed, 1);
    }

    /// Validates `TaskHandle::join` behavior for the failing task scenario.
    ///
    /// Assertions:
    /// - Confirms the task's own error is delivered through the handle.
    /// - Confirms the `failed` counter increments.
    #[tokio::test]
    async fn failing_task_reports_through_handle() {
        let queue = TaskQueue::new(2).unwrap();

        let handle = queue.submit(0, async { Err::<(), _>("boom".to_string()) }).await;
        match handle.join().await {
            Err(TaskError::Failed { source }) => assert_eq!(source, "boom"),
            other => panic!("expected Failed, got {:?}", other.map(|_| ())),
        }

        queue.await_idle().await;
        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }

    /// Validates `QueuedTask` ordering for the priority-fair backlog
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms higher priority pops first with FIFO tiebreak.
    #[test]
    fn backlog_orders_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        let body = || -> TaskFuture { Box::pin(async { false }) };

        heap.push(QueuedTask { priority: 1, sequence: 0, body: body() });
        heap.push(QueuedTask { priority: 3, sequence: 1, body: body() });
        heap.push(QueuedTask { priority: 3, sequence: 2, body: body() });
        heap.push(QueuedTask { priority: 2, sequence: 3, body: body() });

        let order: Vec<(i32, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|t| (t.priority, t.sequence))
            .collect();

        assert_eq!(order, vec![(3, 1), (3, 2), (2, 3), (1, 0)]);
    }
}
