//! In-process queue for single-node deployments and tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{JobOutcome, JobQueue, QueueError};
use crate::job::{JobId, RegistrationJob};

/// Outcomes kept for jobs nobody is waiting on any more.
pub const DEFAULT_RETAINED_OUTCOMES: usize = 10_000;

#[derive(Debug, Default)]
struct QueueState {
    /// Newest at the front, claimed from the back.
    pending: VecDeque<RegistrationJob>,
    in_progress: HashSet<JobId>,
    outcomes: HashMap<JobId, JobOutcome>,
    /// Completion order, oldest first.
    completed: VecDeque<JobId>,
}

impl QueueState {
    fn record(&mut self, id: JobId, outcome: JobOutcome, retained: usize) {
        self.in_progress.remove(&id);
        self.outcomes.insert(id, outcome);
        self.completed.push_back(id);
        while self.completed.len() > retained {
            if let Some(oldest) = self.completed.pop_front() {
                self.outcomes.remove(&oldest);
            }
        }
    }

    fn outcome_is(&self, id: JobId, outcome: JobOutcome) -> bool {
        self.outcomes.get(&id) == Some(&outcome)
    }
}

/// [`JobQueue`] held in memory and shared through an `Arc`.
///
/// Outcomes are dropped when a waiter forgets them; at most
/// [`DEFAULT_RETAINED_OUTCOMES`] unread outcomes are kept, oldest evicted
/// first.
#[derive(Debug)]
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
    changed: Notify,
    retained: usize,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            changed: Notify::new(),
            retained: DEFAULT_RETAINED_OUTCOMES,
        }
    }
}

impl MemoryJobQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retained` unread outcomes.
    #[must_use]
    pub const fn with_retained_outcomes(mut self, retained: usize) -> Self {
        self.retained = retained;
        self
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of jobs still waiting for a worker.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }

    /// Number of recorded outcomes not yet forgotten.
    #[must_use]
    pub fn outcome_len(&self) -> usize {
        self.state().outcomes.len()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &RegistrationJob) -> Result<(), QueueError> {
        self.state().pending.push_front(job.clone());
        self.changed.notify_waiters();
        Ok(())
    }

    async fn pending_window(&self, limit: usize) -> Result<Vec<RegistrationJob>, QueueError> {
        Ok(self
            .state()
            .pending
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn in_progress(&self, id: JobId) -> Result<bool, QueueError> {
        Ok(self.state().in_progress.contains(&id))
    }

    async fn succeeded(&self, id: JobId) -> Result<bool, QueueError> {
        Ok(self.state().outcome_is(id, JobOutcome::Succeeded))
    }

    async fn failed(&self, id: JobId) -> Result<bool, QueueError> {
        Ok(self.state().outcome_is(id, JobOutcome::Failed))
    }

    async fn claim_next(&self) -> Result<Option<RegistrationJob>, QueueError> {
        let claimed = {
            let mut state = self.state();
            let job = state.pending.pop_back();
            if let Some(job) = &job {
                state.in_progress.insert(job.id);
            }
            job
        };
        if claimed.is_some() {
            self.changed.notify_waiters();
        }
        Ok(claimed)
    }

    async fn complete(&self, id: JobId, outcome: JobOutcome) -> Result<(), QueueError> {
        self.state().record(id, outcome, self.retained);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn forget(&self, id: JobId) -> Result<(), QueueError> {
        self.state().outcomes.remove(&id);
        Ok(())
    }

    async fn wait_for_change(&self, interval: Duration) -> Result<bool, QueueError> {
        Ok(tokio::time::timeout(interval, self.changed.notified())
            .await
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn job(url: &str) -> RegistrationJob {
        RegistrationJob::new("item", url, Utc::now())
    }

    #[rstest]
    #[tokio::test]
    async fn claims_in_submission_order() {
        let queue = MemoryJobQueue::new();
        let first = job("https://host/a.json");
        let second = job("https://host/b.json");
        queue.enqueue(&first).await.expect("enqueue");
        queue.enqueue(&second).await.expect("enqueue");

        let window = queue.pending_window(100).await.expect("window");
        assert_eq!(window, vec![first.clone(), second.clone()]);

        let claimed = queue.claim_next().await.expect("claim");
        assert_eq!(claimed.as_ref().map(|job| job.id), Some(first.id));
        assert!(queue.in_progress(first.id).await.expect("in progress"));
        assert_eq!(queue.pending_len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn completion_moves_jobs_into_outcome_sets() {
        let queue = MemoryJobQueue::new();
        let ok = job("https://host/ok.json");
        let bad = job("https://host/bad.json");
        queue.enqueue(&ok).await.expect("enqueue");
        queue.enqueue(&bad).await.expect("enqueue");
        let _ok = queue.claim_next().await.expect("claim");
        let _bad = queue.claim_next().await.expect("claim");

        queue.complete(ok.id, JobOutcome::Succeeded).await.expect("complete");
        queue.complete(bad.id, JobOutcome::Failed).await.expect("complete");

        assert!(queue.succeeded(ok.id).await.expect("succeeded"));
        assert!(!queue.failed(ok.id).await.expect("failed"));
        assert!(queue.failed(bad.id).await.expect("failed"));
        assert!(!queue.in_progress(bad.id).await.expect("in progress"));
    }

    #[rstest]
    #[tokio::test]
    async fn forgotten_outcomes_are_released() {
        let queue = MemoryJobQueue::new();
        let done = job("https://host/done.json");
        queue.enqueue(&done).await.expect("enqueue");
        let _claimed = queue.claim_next().await.expect("claim");
        queue.complete(done.id, JobOutcome::Succeeded).await.expect("complete");
        assert_eq!(queue.outcome_len(), 1);

        queue.forget(done.id).await.expect("forget");
        assert_eq!(queue.outcome_len(), 0);
        assert!(!queue.succeeded(done.id).await.expect("succeeded"));
    }

    #[rstest]
    #[tokio::test]
    async fn unread_outcomes_are_capped_oldest_first() {
        let queue = MemoryJobQueue::new().with_retained_outcomes(2);
        let jobs = [
            job("https://host/1.json"),
            job("https://host/2.json"),
            job("https://host/3.json"),
        ];
        for queued in &jobs {
            queue.enqueue(queued).await.expect("enqueue");
            let _claimed = queue.claim_next().await.expect("claim");
            queue.complete(queued.id, JobOutcome::Failed).await.expect("complete");
        }
        assert_eq!(queue.outcome_len(), 2);
        let [first, second, third] = &jobs;
        assert!(!queue.failed(first.id).await.expect("failed"));
        assert!(queue.failed(second.id).await.expect("failed"));
        assert!(queue.failed(third.id).await.expect("failed"));
    }

    #[rstest]
    #[tokio::test]
    async fn empty_queue_claims_nothing() {
        let queue = MemoryJobQueue::new();
        assert!(queue.claim_next().await.expect("claim").is_none());
        assert!(
            !queue
                .wait_for_change(Duration::from_millis(5))
                .await
                .expect("wait")
        );
    }
}
