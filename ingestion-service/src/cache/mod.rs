//! Read-through cache for derived per-owner views.
//!
//! The cache is advisory: every backend failure is logged and the caller
//! falls through to the source of truth. Empty views are never written, and
//! an empty value found in the cache is treated as a miss.
//!
//! Every invalidation bumps a generation shared by all clones. A load that
//! overlaps an invalidation returns its value but does not write it back,
//! so a view read before a commit cannot outlive it. The guard is
//! per-process: a reader in another process can still write back a view
//! loaded before the commit, bounded by the view TTL.

mod keys;
mod memory;
mod redis;

pub use self::keys::{escape_glob, CacheKeys};
pub use self::memory::{glob_match, MemoryCache};
pub use self::redis::RedisCache;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Delete every key matching a glob pattern. Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;
    async fn health_check(&self) -> Result<(), CacheError>;
}

/// Views that can be empty. Empty views are never cached so a read racing
/// ingestion cannot pin "no data" for a whole TTL.
pub trait CacheView {
    fn is_empty_view(&self) -> bool;
}

impl<T> CacheView for Vec<T> {
    fn is_empty_view(&self) -> bool {
        self.is_empty()
    }
}

#[derive(Clone)]
pub struct ReadThroughCache {
    store: Option<Arc<dyn CacheStore>>,
    generation: Arc<AtomicU64>,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Every lookup misses and every write is skipped.
    pub fn disabled() -> Self {
        Self {
            store: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + CacheView,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.lookup::<T>(key).await {
            metrics::counter!("view_cache_hits_total").increment(1);
            return Ok(hit);
        }
        metrics::counter!("view_cache_misses_total").increment(1);

        let generation = self.generation.load(Ordering::SeqCst);
        let value = loader().await?;
        self.populate(key, &value, ttl, generation).await;
        Ok(value)
    }

    /// Skip the lookup but still repopulate with the fresh value.
    pub async fn refresh<T, E, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T, E>
    where
        T: Serialize + CacheView,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.generation.load(Ordering::SeqCst);
        let value = loader().await?;
        self.populate(key, &value, ttl, generation).await;
        Ok(value)
    }

    async fn discard(&self, key: &str) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.delete(key).await {
            tracing::warn!(key = %key, error = %e, "Cache delete failed");
            metrics::counter!("view_cache_errors_total", "op" => "delete").increment(1);
        }
    }

    /// Delete every key matching `pattern` (glob syntax).
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        let Some(store) = &self.store else { return 0 };
        self.generation.fetch_add(1, Ordering::SeqCst);
        match store.delete_pattern(pattern).await {
            Ok(removed) => {
                tracing::debug!(pattern = %pattern, removed, "Cache invalidated");
                removed
            }
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Cache invalidation failed");
                metrics::counter!("view_cache_errors_total", "op" => "delete_pattern").increment(1);
                0
            }
        }
    }

    pub async fn health_check(&self) -> Result<(), CacheError> {
        match &self.store {
            Some(store) => store.health_check().await,
            None => Ok(()),
        }
    }

    async fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned + CacheView,
    {
        let store = self.store.as_ref()?;
        let raw = match store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, loading from store");
                metrics::counter!("view_cache_errors_total", "op" => "get").increment(1);
                return None;
            }
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) if !value.is_empty_view() => Some(value),
            Ok(_) => {
                self.discard(key).await;
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.discard(key).await;
                None
            }
        }
    }

    /// Write `value` back unless an invalidation ran since `generation` was read.
    async fn populate<T>(&self, key: &str, value: &T, ttl: Duration, generation: u64)
    where
        T: Serialize + CacheView,
    {
        let Some(store) = &self.store else { return };
        if value.is_empty_view() {
            return;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(key = %key, "Views invalidated during load, skipping write-back");
            return;
        }

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = store.set(key, &raw, ttl).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
            metrics::counter!("view_cache_errors_total", "op" => "set").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(60);

    async fn load_counted(
        calls: &AtomicUsize,
        value: Vec<u32>,
    ) -> Result<Vec<u32>, std::convert::Infallible> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let cache = ReadThroughCache::new(Arc::new(MemoryCache::new()));
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_load("k", TTL, || load_counted(&calls, vec![1, 2]))
            .await
            .unwrap();
        let second = cache
            .get_or_load("k", TTL, || load_counted(&calls, vec![9]))
            .await
            .unwrap();

        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_results_are_not_cached() {
        let store = Arc::new(MemoryCache::new());
        let cache = ReadThroughCache::new(store.clone());
        let calls = AtomicUsize::new(0);

        let empty = cache
            .get_or_load("k", TTL, || load_counted(&calls, vec![]))
            .await
            .unwrap();
        assert!(empty.is_empty());
        assert!(store.get("k").await.unwrap().is_none());

        let filled = cache
            .get_or_load("k", TTL, || load_counted(&calls, vec![7]))
            .await
            .unwrap();
        assert_eq!(filled, vec![7]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cached_empty_value_is_a_miss() {
        let store = Arc::new(MemoryCache::new());
        store.set("k", "[]", TTL).await.unwrap();
        let cache = ReadThroughCache::new(store);
        let calls = AtomicUsize::new(0);

        let value = cache
            .get_or_load("k", TTL, || load_counted(&calls, vec![3]))
            .await
            .unwrap();
        assert_eq!(value, vec![3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_empty_entry_is_evicted() {
        let store = Arc::new(MemoryCache::new());
        store.set("k", "[]", TTL).await.unwrap();
        let cache = ReadThroughCache::new(store.clone());
        let calls = AtomicUsize::new(0);

        let value = cache
            .get_or_load("k", TTL, || load_counted(&calls, Vec::new()))
            .await
            .unwrap();
        assert!(value.is_empty());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_overlapping_an_invalidation_is_not_written_back() {
        let store = Arc::new(MemoryCache::new());
        let cache = ReadThroughCache::new(store.clone());
        let calls = AtomicUsize::new(0);

        let before_commit = cache
            .get_or_load("dashboard:u1", TTL, || async {
                cache.invalidate("dashboard:u1").await;
                load_counted(&calls, vec![1]).await
            })
            .await
            .unwrap();
        assert_eq!(before_commit, vec![1]);
        assert!(store.get("dashboard:u1").await.unwrap().is_none());

        let after_commit = cache
            .get_or_load("dashboard:u1", TTL, || load_counted(&calls, vec![1, 2]))
            .await
            .unwrap();
        assert_eq!(after_commit, vec![1, 2]);
        assert!(store.get("dashboard:u1").await.unwrap().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn outage_falls_through_to_loader() {
        let store = Arc::new(MemoryCache::new());
        store.set_available(false);
        let cache = ReadThroughCache::new(store);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_load("k", TTL, || load_counted(&calls, vec![4]))
                .await
                .unwrap();
            assert_eq!(value, vec![4]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.invalidate("*").await, 0);
    }

    #[tokio::test]
    async fn disabled_cache_always_loads() {
        let cache = ReadThroughCache::disabled();
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            cache
                .get_or_load("k", TTL, || load_counted(&calls, vec![1]))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
