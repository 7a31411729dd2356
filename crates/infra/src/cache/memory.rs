//! In-process cache backend with per-entry expiry.
//!
//! Stands in for Redis in development and tests. Expired entries are dropped
//! on read, and every [`SWEEP_EVERY`] writes the whole map is swept.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{CacheBackend, CacheError};

pub const SWEEP_EVERY: usize = 256;

#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    writes: AtomicUsize,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|(_, expires)| *expires > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored entries, expired ones included.
    #[cfg(test)]
    fn stored(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }
}

fn poisoned() -> CacheError {
    CacheError::Transport("cache lock poisoned".to_string())
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expires)) if *expires > now => return Ok(Some(value.clone())),
                Some(_) => {}
            }
        }
        // Expired: evict.
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.get(key).is_some_and(|(_, expires)| *expires <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            entries.retain(|_, (_, expires)| *expires > now);
        }
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("k", "v".into(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());

        cache.set_with_ttl("k", "v".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_swept_without_being_read() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("keep", "v".into(), Duration::from_secs(60)).await.unwrap();
        for i in 0..SWEEP_EVERY * 2 {
            cache.set_with_ttl(&format!("gone-{i}"), "v".into(), Duration::ZERO).await.unwrap();
        }
        assert!(cache.stored() <= SWEEP_EVERY, "stored {}", cache.stored());
        assert_eq!(cache.get("keep").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn delete_of_absent_key_succeeds() {
        let cache = InMemoryCache::new();
        cache.delete("nothing").await.unwrap();
        cache.delete("nothing").await.unwrap();
    }
}
