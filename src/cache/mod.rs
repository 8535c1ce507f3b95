use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

pub mod redis;

pub use self::redis::RedisCache;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Short-lived, non-authoritative copy of account balances.
///
/// A miss or an error is never fatal: callers fall back to the registry and
/// the store.
#[async_trait]
pub trait BalanceCache: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<f64>, CacheError>;

    // set overwrites unconditionally and restarts the ttl
    async fn set(&self, id: &str, balance: f64) -> Result<(), CacheError>;
}

/// Used when caching is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl BalanceCache for NoCache {
    async fn get(&self, _id: &str) -> Result<Option<f64>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _id: &str, _balance: f64) -> Result<(), CacheError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, (f64, Instant)>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        MemoryCache {
            entries: DashMap::new(),
            ttl,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[async_trait]
impl BalanceCache for MemoryCache {
    async fn get(&self, id: &str) -> Result<Option<f64>, CacheError> {
        let now = Instant::now();
        match self.entries.get(id).map(|entry| *entry) {
            Some((balance, expires_at)) if expires_at > now => Ok(Some(balance)),
            Some(_) => {
                self.entries
                    .remove_if(id, |_, (_, expires_at)| *expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, id: &str, balance: f64) -> Result<(), CacheError> {
        self.entries
            .insert(id.to_string(), (balance, Instant::now() + self.ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_hit_and_overwrite() {
        let cache = MemoryCache::default();
        assert_eq!(cache.get("a").await.unwrap(), None);
        cache.set("a", 10.0).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(10.0));
        cache.set("a", 4.0).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(4.0));
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new(Duration::from_millis(20));
        cache.set("a", 1.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.entries.is_empty());
    }

    #[tokio::test]
    async fn test_no_cache_always_misses() {
        let cache = NoCache;
        cache.set("a", 1.0).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
    }
}
