//! Consumer side of the job queue.

use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use tracing::{error, info};

use crate::{
    job::RegistrationJob,
    queue::{JobOutcome, JobQueue, QueueError},
};

/// Claim the next pending job, run `handler` on it and record the outcome.
///
/// Returns `None` when nothing is pending. Handler errors are logged and
/// recorded as [`JobOutcome::Failed`]; only queue errors are returned.
pub async fn process_next<F, Fut, E>(
    queue: &dyn JobQueue,
    handler: F,
) -> Result<Option<(RegistrationJob, JobOutcome)>, QueueError>
where
    F: FnOnce(RegistrationJob) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let Some(job) = queue.claim_next().await? else {
        return Ok(None);
    };
    let outcome = match handler(job.clone()).await {
        Ok(()) => {
            info!(job = %job.id, kind = %job.kind, url = %job.url, "registered");
            JobOutcome::Succeeded
        }
        Err(err) => {
            error!(job = %job.id, kind = %job.kind, url = %job.url, "registration failed: {err}");
            JobOutcome::Failed
        }
    };
    queue.complete(job.id, outcome).await?;
    Ok(Some((job, outcome)))
}

/// Process jobs forever, waiting up to `idle` between empty polls.
pub async fn run_worker<F, Fut, E>(
    queue: Arc<dyn JobQueue>,
    idle: Duration,
    handler: F,
) -> Result<(), QueueError>
where
    F: Fn(RegistrationJob) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    loop {
        if process_next(queue.as_ref(), &handler).await?.is_none() {
            queue.wait_for_change(idle).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryJobQueue;
    use chrono::Utc;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn empty_queue_processes_nothing() {
        let queue = MemoryJobQueue::new();
        let processed = process_next(&queue, |_job| async { Ok::<(), String>(()) })
            .await
            .expect("process");
        assert!(processed.is_none());
    }

    #[rstest]
    #[case(Ok(()), JobOutcome::Succeeded)]
    #[case(Err("unknown resource type `granule`".to_owned()), JobOutcome::Failed)]
    #[tokio::test]
    async fn handler_result_decides_the_outcome(
        #[case] result: Result<(), String>,
        #[case] expected: JobOutcome,
    ) {
        let queue = MemoryJobQueue::new();
        let job = RegistrationJob::new("granule", "https://host/item.json", Utc::now());
        queue.enqueue(&job).await.expect("enqueue");

        let processed = process_next(&queue, |claimed| async move {
            assert_eq!(claimed.kind, "granule");
            result
        })
        .await
        .expect("process");

        assert_eq!(processed.map(|(_, outcome)| outcome), Some(expected));
        assert!(!queue.in_progress(job.id).await.expect("in progress"));
        let recorded = match expected {
            JobOutcome::Succeeded => queue.succeeded(job.id).await,
            JobOutcome::Failed => queue.failed(job.id).await,
        };
        assert!(recorded.expect("outcome set"));
    }
}
