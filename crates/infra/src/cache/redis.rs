//! Redis cache backend (optional, feature `redis`).
//!
//! Uses a multiplexed `ConnectionManager`, which reconnects on its own and is
//! cheap to clone per call.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{CacheBackend, CacheError};

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(Self { conn })
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // EX 0 is rejected by Redis.
        let seconds = ttl.as_secs().max(1);
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(())
    }
}
