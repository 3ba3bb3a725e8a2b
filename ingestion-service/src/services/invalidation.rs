use tracing::debug;

use crate::cache::{CacheKeys, ReadThroughCache};

/// Maps data changes to the cached views they stale.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: ReadThroughCache,
}

impl CacheInvalidator {
    pub fn new(cache: ReadThroughCache) -> Self {
        Self { cache }
    }

    async fn invalidate_all(&self, patterns: Vec<String>) -> u64 {
        let mut removed = 0;
        for pattern in &patterns {
            removed += self.cache.invalidate(pattern).await;
        }
        removed
    }

    /// New or touched transactions change both the listing and the dashboard.
    pub async fn transactions_changed(&self, owner_id: &str) -> u64 {
        let mut patterns = CacheKeys::transactions_patterns(owner_id);
        patterns.extend(CacheKeys::dashboard_patterns(owner_id));
        let removed = self.invalidate_all(patterns).await;
        debug!(owner_id = %owner_id, removed, "Invalidated transaction views");
        removed
    }

    pub async fn profile_changed(&self, owner_id: &str) -> u64 {
        self.invalidate_all(CacheKeys::dashboard_patterns(owner_id)).await
    }

    pub async fn insights_changed(&self, owner_id: &str) -> u64 {
        self.invalidate_all(CacheKeys::insights_patterns(owner_id)).await
    }

    pub async fn invalidate_owner(&self, owner_id: &str) -> u64 {
        let removed = self.invalidate_all(CacheKeys::owner_patterns(owner_id)).await;
        debug!(owner_id = %owner_id, removed, "Invalidated all owner views");
        removed
    }
}
