use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::models::job::Job;

/// FIFO list of pending audit jobs.
///
/// `pop` hands back the raw payload so that malformed jobs can be
/// reported by the caller instead of surfacing as queue failures.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Non-blocking pop from the head of the queue.
    async fn pop(&self) -> Result<Option<String>, QueueError>;

    /// Append a job to the tail of the queue.
    async fn push(&self, job: &Job) -> Result<(), QueueError>;
}

/// Redis list consumed with `LPOP`; producers `RPUSH` onto the same key.
pub struct RedisJobQueue {
    conn: MultiplexedConnection,
    queue_name: String,
}

impl RedisJobQueue {
    pub fn new(conn: MultiplexedConnection, queue_name: impl Into<String>) -> Self {
        Self {
            conn,
            queue_name: queue_name.into(),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn pop(&self) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.lpop(&self.queue_name, None).await?;
        Ok(payload)
    }

    async fn push(&self, job: &Job) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(job)?;
        conn.rpush::<_, _, ()>(&self.queue_name, payload).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
