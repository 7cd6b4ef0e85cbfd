//! Redis-backed queue shared by gateway replicas and worker processes.
//!
//! Pending jobs live in a list (`LPUSH` to enqueue, `RPOP` to claim); the
//! in-progress, succeeded and failed states are sets of job identifiers.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};

use super::{JobOutcome, JobQueue, QueueError};
use crate::job::{JobId, RegistrationJob};

/// Key names of the queue structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    /// List of pending job messages.
    pub pending: String,
    /// Set of job identifiers held by workers.
    pub in_progress: String,
    /// Set of succeeded job identifiers.
    pub succeeded: String,
    /// Set of failed job identifiers.
    pub failed: String,
}

impl Default for QueueKeys {
    fn default() -> Self {
        Self {
            pending: "register_queue".to_owned(),
            in_progress: "register_progress".to_owned(),
            succeeded: "register_success".to_owned(),
            failed: "register_failure".to_owned(),
        }
    }
}

/// [`JobQueue`] over a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisJobQueue {
    connection: MultiplexedConnection,
    keys: QueueKeys,
}

impl std::fmt::Debug for RedisJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobQueue")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl RedisJobQueue {
    /// Connect to the Redis server at `host:port` using the default keys.
    pub async fn connect(host: &str, port: u16) -> Result<Self, QueueError> {
        let client = Client::open(format!("redis://{host}:{port}/"))?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        Ok(Self {
            connection,
            keys: QueueKeys::default(),
        })
    }

    /// Use `keys` instead of the default key names.
    #[must_use]
    pub fn with_keys(mut self, keys: QueueKeys) -> Self {
        self.keys = keys;
        self
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    async fn is_member(&self, key: &str, id: JobId) -> Result<bool, QueueError> {
        Ok(self.conn().sismember(key, id.to_string()).await?)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &RegistrationJob) -> Result<(), QueueError> {
        let message = job.to_json().map_err(QueueError::Encode)?;
        self.conn()
            .lpush::<_, _, ()>(&self.keys.pending, message)
            .await?;
        Ok(())
    }

    async fn pending_window(&self, limit: usize) -> Result<Vec<RegistrationJob>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = isize::try_from(limit).map_or(isize::MIN, |limit| -limit);
        let messages: Vec<String> = self.conn().lrange(&self.keys.pending, start, -1).await?;
        messages
            .iter()
            .rev()
            .map(|message| RegistrationJob::from_json(message).map_err(QueueError::Decode))
            .collect()
    }

    async fn in_progress(&self, id: JobId) -> Result<bool, QueueError> {
        self.is_member(&self.keys.in_progress, id).await
    }

    async fn succeeded(&self, id: JobId) -> Result<bool, QueueError> {
        self.is_member(&self.keys.succeeded, id).await
    }

    async fn failed(&self, id: JobId) -> Result<bool, QueueError> {
        self.is_member(&self.keys.failed, id).await
    }

    async fn claim_next(&self) -> Result<Option<RegistrationJob>, QueueError> {
        let mut conn = self.conn();
        let message: Option<String> = conn.rpop(&self.keys.pending, None).await?;
        let Some(message) = message else {
            return Ok(None);
        };
        let job = RegistrationJob::from_json(&message).map_err(QueueError::Decode)?;
        conn.sadd::<_, _, ()>(&self.keys.in_progress, job.id.to_string())
            .await?;
        Ok(Some(job))
    }

    async fn complete(&self, id: JobId, outcome: JobOutcome) -> Result<(), QueueError> {
        let target = match outcome {
            JobOutcome::Succeeded => &self.keys.succeeded,
            JobOutcome::Failed => &self.keys.failed,
        };
        let member = id.to_string();
        let mut conn = self.conn();
        conn.srem::<_, _, ()>(&self.keys.in_progress, &member).await?;
        conn.sadd::<_, _, ()>(target, &member).await?;
        Ok(())
    }

    async fn forget(&self, id: JobId) -> Result<(), QueueError> {
        let member = id.to_string();
        let mut conn = self.conn();
        conn.srem::<_, _, ()>(&self.keys.succeeded, &member).await?;
        conn.srem::<_, _, ()>(&self.keys.failed, &member).await?;
        Ok(())
    }

    async fn wait_for_change(&self, interval: Duration) -> Result<bool, QueueError> {
        tokio::time::sleep(interval).await;
        Ok(false)
    }
}
