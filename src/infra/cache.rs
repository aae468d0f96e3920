//! Redis backend for the branch cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::cache::{CacheError, CacheStore};

use super::error::InfraError;

/// Redis-backed [`CacheStore`]. Each call works on its own clone of the
/// multiplexed connection manager; no call waits for another to finish.
#[derive(Clone)]
pub struct RedisCacheStore {
    redis: ConnectionManager,
}

impl RedisCacheStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| InfraError::cache(format!("invalid redis url: {err}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| InfraError::cache(format!("failed to connect to redis: {err}")))?;
        info!("Redis cache connected");
        Ok(Self::new(manager))
    }

    pub async fn ping(&self) -> Result<(), InfraError> {
        let mut conn = self.redis.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| InfraError::cache(format!("redis ping failed: {err}")))
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(key).await?;
        debug!(key = %key, hit = value.is_some(), "Redis get");
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        debug!(key = %key, ttl = seconds, "Redis set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
