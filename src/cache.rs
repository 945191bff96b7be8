//! Injected key/value cache used for provider tokens and scoring rules.

use crate::cache_validator::ValidatedCacheEntry;
use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use std::time::Duration;

/// Minimal cache contract. Writes are plain value replacements, so concurrent
/// callers may race; the last writer wins.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`. `None` keeps it until invalidated or evicted.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>);

    async fn invalidate(&self, key: &str);
}

/// In-process cache backed by moka, storing checksummed entries.
#[derive(Clone)]
pub struct MokaCacheService {
    inner: Cache<String, String>,
}

impl MokaCacheService {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(max_capacity).build(),
        }
    }
}

impl Default for MokaCacheService {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[async_trait]
impl CacheService for MokaCacheService {
    async fn get(&self, key: &str) -> Option<String> {
        let cached = self.inner.get(key).await?;
        match ValidatedCacheEntry::deserialize_and_validate(&cached, Utc::now()) {
            Some(data) => {
                tracing::debug!("Cache HIT (validated): {}", key);
                Some(data)
            }
            None => {
                tracing::debug!("Cache entry for {} is stale or corrupted, evicting", key);
                self.inner.invalidate(key).await;
                None
            }
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) {
        let entry = ValidatedCacheEntry::new(value, ttl, Utc::now());
        self.inner.insert(key.to_string(), entry.serialize()).await;
    }

    async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}
