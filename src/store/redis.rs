use std::future::Future;
use std::time::Duration;

use redis::{AsyncCommands, RedisResult};
use redis::aio::ConnectionManager;

use super::{KeyValueStore, StoreError};

/// Redis-backed store. Clones share one multiplexed connection, which is
/// opened once at startup and re-established by the manager on failure.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
    op_timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis. Every key is stored as `{instance_name}:{key}` so
    /// several deployments can share one database.
    pub async fn connect(
        redis_url: &str,
        instance_name: &str,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = with_deadline(op_timeout, ConnectionManager::new(client)).await?;
        Ok(Self {
            conn,
            key_prefix: prefix_for(instance_name),
            op_timeout,
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

/// Bound a Redis call by `op_timeout`. Both an elapsed deadline and a Redis
/// timeout error come back as `StoreError::Timeout`.
async fn with_deadline<T>(
    op_timeout: Duration,
    op: impl Future<Output = RedisResult<T>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(op_timeout, op).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StoreError::Timeout),
    }
}

fn prefix_for(instance_name: &str) -> String {
    if instance_name.is_empty() {
        String::new()
    } else {
        format!("{instance_name}:")
    }
}

impl KeyValueStore for RedisStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let value: Option<String> = with_deadline(self.op_timeout, conn.get(&key)).await?;
        Ok(value)
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        with_deadline(self.op_timeout, conn.set::<_, _, ()>(&key, value)).await
    }
}
