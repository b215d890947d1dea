//! Cache tier: a key/value store with per-key TTL.
//!
//! Backends only move bytes. [`Cache`] layers JSON (de)serialization and
//! the TTL policy on top and treats every backend failure as a miss, so the
//! cache can never fail a request.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CacheConfig;

pub mod keys;
mod memory;
mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;
}

/// Expiry per key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub record: Duration,
    pub trending: Duration,
    pub popular: Duration,
    pub browse: Duration,
    pub spotlight: Duration,
    pub search: Duration,
}

impl From<&CacheConfig> for CacheTtl {
    fn from(config: &CacheConfig) -> Self {
        Self {
            record: Duration::from_secs(config.record_ttl_seconds),
            trending: Duration::from_secs(config.trending_ttl_seconds),
            popular: Duration::from_secs(config.popular_ttl_seconds),
            browse: Duration::from_secs(config.browse_ttl_seconds),
            spotlight: Duration::from_secs(config.spotlight_ttl_seconds),
            search: Duration::from_secs(config.search_ttl_seconds),
        }
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    ttl: CacheTtl,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: CacheTtl) -> Self {
        Self { backend, ttl }
    }

    /// In-process cache, used when no Redis URL is configured and in tests.
    #[must_use]
    pub fn in_memory(ttl: CacheTtl) -> Self {
        Self::new(Arc::new(MemoryCache::new()), ttl)
    }

    /// Connects to Redis when configured, otherwise falls back to memory.
    pub async fn from_config(config: &CacheConfig) -> anyhow::Result<Self> {
        let ttl = CacheTtl::from(config);
        match &config.redis_url {
            Some(url) => {
                let backend = RedisCache::connect(url).await?;
                tracing::info!("Cache tier connected to Redis");
                Ok(Self::new(Arc::new(backend), ttl))
            }
            None => {
                tracing::info!("No Redis URL configured, using in-process cache");
                Ok(Self::in_memory(ttl))
            }
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> &CacheTtl {
        &self.ttl
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                metrics::counter!("animeverse_cache_total", "outcome" => "miss").increment(1);
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                metrics::counter!("animeverse_cache_total", "outcome" => "hit").increment(1);
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache value");
                return;
            }
        };

        if let Err(e) = self.backend.set(key, bytes, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        } else {
            debug!(key, ttl_secs = ttl.as_secs(), "Cached value");
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!(key, error = %e, "Cache delete failed");
        }
    }

    pub async fn invalidate<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            self.delete(key.as_ref()).await;
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.backend.exists(key).await.unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache exists check failed");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            anyhow::bail!("connection refused")
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }

        async fn delete(&self, _key: &str) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }

        async fn exists(&self, _key: &str) -> anyhow::Result<bool> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn json_round_trip_through_memory_backend() {
        let cache = Cache::in_memory(CacheTtl::default());
        cache
            .set_json("k", &vec!["a".to_string()], Duration::from_secs(60))
            .await;

        assert!(cache.exists("k").await);
        assert_eq!(cache.get_json::<Vec<String>>("k").await, Some(vec!["a".to_string()]));

        cache.invalidate(["k"]).await;
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn backend_failures_degrade_to_miss() {
        let cache = Cache::new(Arc::new(BrokenBackend), CacheTtl::default());
        cache.set_json("k", &1, Duration::from_secs(1)).await;
        assert_eq!(cache.get_json::<i32>("k").await, None);
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn undecodable_entries_are_dropped() {
        let cache = Cache::in_memory(CacheTtl::default());
        cache.set_json("k", &"text", Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<Vec<i32>>("k").await, None);
        assert!(!cache.exists("k").await);
    }
}
