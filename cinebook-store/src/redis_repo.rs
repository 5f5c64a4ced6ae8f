use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use cinebook_core::repository::{LockError, LockToken, ShowLock};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// `SET key token NX PX ttl`; true when this caller now owns the key.
    pub async fn try_lock(&self, key: &str, token: &str, ttl_ms: u64) -> Result<bool, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    /// Deletes the key only if it still carries `token`.
    pub async fn unlock(&self, key: &str, token: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#);

        let deleted: i64 = script.key(key).arg(token).invoke_async(&mut conn).await?;
        Ok(deleted == 1)
    }
}

/// Per-show lock shared by every API instance.
pub struct RedisShowLock {
    redis: RedisClient,
    ttl_ms: u64,
    wait: Duration,
}

impl RedisShowLock {
    pub fn new(redis: RedisClient, ttl_ms: u64, wait: Duration) -> Self {
        Self { redis, ttl_ms, wait }
    }

    fn key(show_id: Uuid) -> String {
        format!("lock:show:{}", show_id)
    }
}

#[async_trait]
impl ShowLock for RedisShowLock {
    async fn acquire(&self, show_id: Uuid) -> Result<LockToken, LockError> {
        let key = Self::key(show_id);
        let token = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + self.wait;

        loop {
            let acquired = self
                .redis
                .try_lock(&key, &token, self.ttl_ms)
                .await
                .map_err(|e| LockError::Backend(e.to_string()))?;
            if acquired {
                debug!(%show_id, "Show lock acquired");
                return Ok(LockToken { show_id, token });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LockError::Timeout(self.wait, show_id));
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }
    }

    async fn release(&self, token: LockToken) -> Result<(), LockError> {
        let released = self
            .redis
            .unlock(&Self::key(token.show_id), &token.token)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        if !released {
            warn!(show_id = %token.show_id, "Show lock had already expired before release");
        }
        Ok(())
    }
}
