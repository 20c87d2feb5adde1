//! Redis-backed identity cache.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{CacheError, IdentityCache};

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

/// Shared cache over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    timeout: Duration,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisCache {
    /// Connect to `url`; every later call is bounded by `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = bounded(timeout, ConnectionManager::new(client)).await??;
        tracing::info!(timeout_ms = timeout.as_millis() as u64, "Connected to Redis identity cache");
        Ok(Self { conn, timeout })
    }
}

async fn bounded<F, T>(limit: Duration, fut: F) -> Result<T, CacheError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| CacheError::Timeout(limit))
}

#[async_trait]
impl IdentityCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = bounded(self.timeout, conn.get(key)).await??;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                bounded(self.timeout, conn.set_ex::<_, _, ()>(key, value, secs)).await??;
            }
            None => {
                bounded(self.timeout, conn.set::<_, _, ()>(key, value)).await??;
            }
        }
        Ok(())
    }
}
