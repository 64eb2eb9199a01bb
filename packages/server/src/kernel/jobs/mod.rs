//! Job infrastructure for background refresh execution.
//!
//! - [`TaskQueue`] - in-process, per-key queue with bounded concurrency
//! - [`RetryPolicy`] - backoff and dead-letter policy for failed tasks
//!
//! # Architecture
//!
//! ```text
//! UpdateOrchestrator.request_update(post_id)
//!     │
//!     ├─► TaskQueue.is_processing(post_id)?  → already processing
//!     └─► TaskQueue.add(post_id, handle_refresh)
//!             └─► slot (≤ max_concurrent) → retry with backoff on error
//! ```

mod queue;
mod retry;

pub use queue::{QueueError, TaskHandle, TaskQueue, TaskQueueConfig, MAX_CONCURRENT_TASKS};
pub use retry::{BackoffStrategy, RetryPolicy};
