use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Serialize;

/// Keyed store with per-key expiration, holding status and report records.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreError>;
}

/// Serialize `value` as JSON and store it with a TTL.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn ResultStore,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<(), StoreError> {
    let payload = serde_json::to_string(value)?;
    store.set(key, payload, ttl_secs).await
}

/// Key of the final report for a job.
pub fn result_key(prefix: &str, job_id: &str) -> String {
    format!("{prefix}{job_id}")
}

/// Key of the progress record for a job.
pub fn status_key(prefix: &str, job_id: &str) -> String {
    format!("{prefix}status:{job_id}")
}

/// Result store backed by Redis `SET ... EX`.
pub struct RedisResultStore {
    conn: MultiplexedConnection,
}

impl RedisResultStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
