//! Wait for a queued registration to reach a terminal state.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::{
    job::JobId,
    queue::{JobQueue, QueueError},
};

/// Number of pending entries inspected when looking for a queued job.
pub const PENDING_WINDOW: usize = 100;

/// Terminal state observed for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The job reached the succeeded set.
    Succeeded,
    /// The job reached the failed set.
    Failed,
    /// The time limit elapsed first.
    TimedOut,
}

/// Queue state last observed for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observed {
    Pending,
    InProgress,
    Unknown,
}

/// Polls a [`JobQueue`] until a job completes or a time limit elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionWaiter {
    interval: Duration,
    time_limit: Duration,
}

impl CompletionWaiter {
    /// Poll every `interval` for at most `time_limit`.
    #[must_use]
    pub const fn new(interval: Duration, time_limit: Duration) -> Self {
        Self {
            interval,
            time_limit,
        }
    }

    /// Configured time limit.
    #[must_use]
    pub const fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Wait for job `id`.
    ///
    /// The deadline is checked before every observation, so a zero time
    /// limit reports [`Completion::TimedOut`] without reading the queue.
    pub async fn wait(&self, queue: &dyn JobQueue, id: JobId) -> Result<Completion, QueueError> {
        let deadline = Instant::now() + self.time_limit;
        let mut last = None;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(Completion::TimedOut);
            }
            let observed = match Self::observe(queue, id).await? {
                Ok(completion) => {
                    queue.forget(id).await?;
                    return Ok(completion);
                }
                Err(observed) => observed,
            };
            if last != Some(observed) {
                debug!("job {id} is {observed:?}");
                last = Some(observed);
            }
            let remaining = deadline.saturating_duration_since(now);
            queue
                .wait_for_change(self.interval.min(remaining))
                .await?;
        }
    }

    async fn observe(
        queue: &dyn JobQueue,
        id: JobId,
    ) -> Result<Result<Completion, Observed>, QueueError> {
        let window = queue.pending_window(PENDING_WINDOW).await?;
        if window.iter().any(|job| job.id == id) {
            return Ok(Err(Observed::Pending));
        }
        if queue.in_progress(id).await? {
            return Ok(Err(Observed::InProgress));
        }
        if queue.succeeded(id).await? {
            return Ok(Ok(Completion::Succeeded));
        }
        if queue.failed(id).await? {
            return Ok(Ok(Completion::Failed));
        }
        Ok(Err(Observed::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        job::RegistrationJob,
        queue::{JobOutcome, MemoryJobQueue},
    };
    use chrono::Utc;
    use rstest::{fixture, rstest};

    #[fixture]
    fn queue() -> Arc<MemoryJobQueue> {
        Arc::new(MemoryJobQueue::new())
    }

    #[fixture]
    fn job() -> RegistrationJob {
        RegistrationJob::new("item", "https://host/item.json", Utc::now())
    }

    #[rstest]
    #[tokio::test]
    async fn zero_budget_times_out(queue: Arc<MemoryJobQueue>, job: RegistrationJob) {
        queue.enqueue(&job).await.expect("enqueue");
        let claimed = queue.claim_next().await.expect("claim");
        assert!(claimed.is_some());
        queue
            .complete(job.id, JobOutcome::Succeeded)
            .await
            .expect("complete");

        let waiter = CompletionWaiter::new(Duration::from_millis(10), Duration::ZERO);
        let completion = waiter.wait(queue.as_ref(), job.id).await.expect("wait");
        assert_eq!(completion, Completion::TimedOut);
    }

    #[rstest]
    #[case(JobOutcome::Succeeded, Completion::Succeeded)]
    #[case(JobOutcome::Failed, Completion::Failed)]
    #[tokio::test]
    async fn reports_the_worker_outcome(
        queue: Arc<MemoryJobQueue>,
        job: RegistrationJob,
        #[case] outcome: JobOutcome,
        #[case] expected: Completion,
    ) {
        queue.enqueue(&job).await.expect("enqueue");
        let worker_queue = Arc::clone(&queue);
        let worker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let claimed = worker_queue.claim_next().await.expect("claim");
            let id = claimed.map(|job| job.id).expect("queued job");
            worker_queue.complete(id, outcome).await.expect("complete");
        });

        let waiter = CompletionWaiter::new(Duration::from_millis(50), Duration::from_secs(5));
        let completion = waiter.wait(queue.as_ref(), job.id).await.expect("wait");
        worker.await.expect("worker");
        assert_eq!(completion, expected);
        assert_eq!(queue.outcome_len(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn unclaimed_jobs_time_out(queue: Arc<MemoryJobQueue>, job: RegistrationJob) {
        queue.enqueue(&job).await.expect("enqueue");
        let waiter = CompletionWaiter::new(Duration::from_millis(5), Duration::from_millis(30));
        let completion = waiter.wait(queue.as_ref(), job.id).await.expect("wait");
        assert_eq!(completion, Completion::TimedOut);
        assert_eq!(queue.pending_len(), 1);
    }
}
