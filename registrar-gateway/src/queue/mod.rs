//! Shared job queue between the gateway and registration workers.
//!
//! Jobs move from the pending list into the in-progress set when a worker
//! claims them, and from there into the succeeded or failed set. The
//! outcome is dropped again once a waiter has reported it.

mod memory;
#[cfg(feature = "queue-redis")]
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{JobId, RegistrationJob};

pub use memory::{DEFAULT_RETAINED_OUTCOMES, MemoryJobQueue};
#[cfg(feature = "queue-redis")]
pub use self::redis::{QueueKeys, RedisJobQueue};

/// Result a worker reports for a claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The resource was registered.
    Succeeded,
    /// Registration failed.
    Failed,
}

/// Errors raised by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A job could not be encoded for the queue.
    #[error("failed to encode registration job: {0}")]
    Encode(#[source] serde_json::Error),
    /// A queued message is not a registration job.
    #[error("failed to decode queued job: {0}")]
    Decode(#[source] serde_json::Error),
    /// The Redis server rejected a command or is unreachable.
    #[cfg(feature = "queue-redis")]
    #[error("redis queue error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Storage for registration jobs and their completion state.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append `job` to the pending list.
    async fn enqueue(&self, job: &RegistrationJob) -> Result<(), QueueError>;

    /// The next `limit` pending jobs in claim order.
    async fn pending_window(&self, limit: usize) -> Result<Vec<RegistrationJob>, QueueError>;

    /// Whether a worker holds job `id`.
    async fn in_progress(&self, id: JobId) -> Result<bool, QueueError>;

    /// Whether job `id` completed successfully.
    async fn succeeded(&self, id: JobId) -> Result<bool, QueueError>;

    /// Whether job `id` failed.
    async fn failed(&self, id: JobId) -> Result<bool, QueueError>;

    /// Take the oldest pending job and mark it in progress.
    async fn claim_next(&self) -> Result<Option<RegistrationJob>, QueueError>;

    /// Move job `id` from in progress to its outcome set.
    async fn complete(&self, id: JobId, outcome: JobOutcome) -> Result<(), QueueError>;

    /// Drop the recorded outcome of job `id` once it has been reported.
    async fn forget(&self, id: JobId) -> Result<(), QueueError>;

    /// Block for at most `interval` or until the queue changes.
    ///
    /// Returns `true` when woken by a change. Backends without change
    /// notification sleep for the whole interval and return `false`.
    async fn wait_for_change(&self, interval: Duration) -> Result<bool, QueueError>;
}
