//! In-process, per-key task queue with bounded concurrency and retry.
//!
//! Every smart media refresh runs through this queue. Jobs are tagged with a
//! key (the post id) so callers can ask whether a post is mid-refresh before
//! enqueuing another one.
//!
//! # Semantics
//!
//! ```text
//! add(key, action) ──► pending (FIFO) ──► slot (≤ max_concurrent)
//!                           ▲                   │
//!                           │   Err             ├─► Ok  → waiter resolved, slot freed
//!                           └── push_front ◄────┘
//!                               slot sleeps for the backoff, then is freed
//! ```
//!
//! - Jobs with the same key are not deduplicated here; use [`TaskQueue::is_processing`].
//! - The processing flag is set when a job is dequeued and cleared as soon as
//!   its attempt settles, before any backoff sleep.
//! - A failed job goes back to the *front* of the queue and nothing else is
//!   started until its backoff has elapsed.
//! - Without `max_attempts` a failing job is retried forever.
//!
//! Single node only: two processes sharing a store can refresh the same post
//! concurrently.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::retry::RetryPolicy;

/// Default number of actions allowed to execute at once.
pub const MAX_CONCURRENT_TASKS: usize = 10;

/// Configuration for a [`TaskQueue`].
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: MAX_CONCURRENT_TASKS,
            retry: RetryPolicy::default(),
        }
    }
}

/// What a waiter can observe besides the action's own value.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task for {key} dead-lettered after {attempts} attempts: {last_error}")]
    DeadLettered {
        key: String,
        attempts: u32,
        last_error: String,
    },

    #[error("task was dropped before completing")]
    Dropped,
}

type Deliver = Box<dyn FnOnce() + Send>;
type Attempt = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Deliver>> + Send + Sync>;
type DeadLetter = Box<dyn FnOnce(QueueError) + Send>;

struct QueuedTask {
    key: String,
    attempts: u32,
    ready_at: Option<Instant>,
    run: Attempt,
    on_dead_letter: DeadLetter,
}

impl QueuedTask {
    fn is_ready(&self, now: Instant) -> bool {
        self.ready_at.map_or(true, |at| at <= now)
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedTask>,
    running: usize,
    /// key -> number of attempts for that key currently executing
    processing: HashMap<String, usize>,
}

struct Inner {
    config: TaskQueueConfig,
    state: Mutex<QueueState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to the eventual result of a queued action.
///
/// Dropping the handle gives up on the result; the job itself keeps running.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(QueueError::Dropped)))
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}

/// Per-key task queue. Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(TaskQueueConfig::default())
    }
}

impl TaskQueue {
    pub fn new(config: TaskQueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn config(&self) -> &TaskQueueConfig {
        &self.inner.config
    }

    /// Enqueue `action` under `key`.
    ///
    /// `action` is invoked once per attempt, so it must be callable repeatedly.
    /// Must be called from within a tokio runtime.
    pub fn add<T, F, Fut>(&self, key: impl Into<String>, action: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let action = Arc::new(action);

        let success_tx = tx.clone();
        let run: Attempt = Arc::new(move || {
            let action = action.clone();
            let tx = success_tx.clone();
            async move {
                let value = (*action)().await?;
                let deliver: Deliver = Box::new(move || {
                    let sender = tx.lock().unwrap_or_else(|e| e.into_inner()).take();
                    if let Some(sender) = sender {
                        let _ = sender.send(Ok(value));
                    }
                });
                Ok(deliver)
            }
            .boxed()
        });

        let on_dead_letter: DeadLetter = Box::new(move |err| {
            let sender = tx.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(sender) = sender {
                let _ = sender.send(Err(err));
            }
        });

        self.inner.lock().pending.push_back(QueuedTask {
            key: key.into(),
            attempts: 0,
            ready_at: None,
            run,
            on_dead_letter,
        });
        self.pump();

        TaskHandle { rx }
    }

    /// True while an attempt for `key` is executing.
    pub fn is_processing(&self, key: &str) -> bool {
        self.inner
            .lock()
            .processing
            .get(key)
            .is_some_and(|count| *count > 0)
    }

    /// Jobs waiting for a slot (including ones backing off at the head).
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Slots currently occupied, by running attempts or backoff sleeps.
    pub fn running_len(&self) -> usize {
        self.inner.lock().running
    }

    /// Start as many ready jobs as free slots allow.
    fn pump(&self) {
        let mut started = Vec::new();
        {
            let mut state = self.inner.lock();
            let now = Instant::now();

            while state.running < self.inner.config.max_concurrent {
                let head_ready = state
                    .pending
                    .front()
                    .is_some_and(|task| task.is_ready(now));
                if !head_ready {
                    break;
                }
                let Some(task) = state.pending.pop_front() else {
                    break;
                };
                state.running += 1;
                *state.processing.entry(task.key.clone()).or_insert(0) += 1;
                started.push(task);
            }
        }

        for task in started {
            debug!(key = %task.key, attempt = task.attempts + 1, "starting queued task");
            let queue = self.clone();
            tokio::spawn(queue.run_slot(task));
        }
    }

    async fn run_slot(self, mut task: QueuedTask) {
        let attempt = (task.run)();
        let outcome = match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow!("task panicked")),
        };

        self.finish_processing(&task.key);

        let err = match outcome {
            Ok(deliver) => {
                debug!(key = %task.key, "queued task succeeded");
                deliver();
                self.release_slot();
                return;
            }
            Err(err) => err,
        };

        task.attempts += 1;
        let key = task.key.clone();
        let attempts = task.attempts;

        if self.inner.config.retry.is_exhausted(attempts) {
            error!(key = %key, attempts, error = %err, "task exhausted its retries, dead-lettering");
            (task.on_dead_letter)(QueueError::DeadLettered {
                key,
                attempts,
                last_error: err.to_string(),
            });
            self.release_slot();
            return;
        }

        let (delay, ready_at) = {
            let mut state = self.inner.lock();
            let delay = self
                .inner
                .config
                .retry
                .delay_for(state.pending.len() + 1, attempts);
            let ready_at = backoff_deadline(delay);
            task.ready_at = Some(ready_at);
            state.pending.push_front(task);
            (delay, ready_at)
        };

        warn!(
            key = %key,
            attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "queued task failed, retrying after backoff"
        );

        tokio::time::sleep_until(ready_at).await;
        self.release_slot();
    }

    fn finish_processing(&self, key: &str) {
        let mut state = self.inner.lock();
        if let Some(count) = state.processing.get_mut(key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.processing.remove(key);
            }
        }
    }

    fn release_slot(&self) {
        {
            let mut state = self.inner.lock();
            state.running = state.running.saturating_sub(1);
        }
        self.pump();
    }
}

fn backoff_deadline(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365 * 30))
}
