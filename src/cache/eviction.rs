//! Least-recently-used eviction against the aggregate size and item caps.

use super::key::{CacheKey, Keyspace};
use super::metadata::scan;
use crate::config::SharedConfig;
use crate::stats::StatsRegistry;
use crate::store::KeyValueStore;
use crate::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Eviction stops once usage falls to this fraction of the cap.
pub const EVICTION_TARGET_RATIO: f64 = 0.8;

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvictionReport {
    pub evicted: usize,
    pub reclaimed_mb: f64,
    /// Megabytes that had to go for the size cap; zero if only the item cap tripped.
    pub target_mb: f64,
    /// Entries that had to go for the item cap.
    pub target_items: u64,
    /// The pass stopped early on a store error.
    pub aborted: bool,
}

/// Removes the least recently accessed entries until the cache is back under
/// [`EVICTION_TARGET_RATIO`] of its caps.
///
/// Passes started with [`EvictionManager::trigger`] are coalesced: while one
/// is running, further triggers are no-ops.
pub struct EvictionManager {
    store: Arc<dyn KeyValueStore>,
    keyspace: Keyspace,
    stats: Arc<StatsRegistry>,
    config: SharedConfig,
    running: Arc<AtomicBool>,
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EvictionManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keyspace: Keyspace,
        stats: Arc<StatsRegistry>,
        config: SharedConfig,
    ) -> Self {
        Self {
            store,
            keyspace,
            stats,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a pass in the background. Returns `None` if a pass is already in
    /// flight or no tokio runtime is available.
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<EvictionReport>> {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::debug!("eviction already in progress");
            return None;
        }
        let guard = RunningGuard(self.running.clone());
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no tokio runtime; eviction skipped");
                return None;
            }
        };
        let this = Arc::clone(self);
        Some(handle.spawn(async move {
            let _guard = guard;
            this.run().await
        }))
    }

    /// Run one pass in the current task.
    ///
    /// Never fails: store errors are logged and end the pass with a partial
    /// report.
    pub async fn run(&self) -> EvictionReport {
        let cfg = self.config.load();
        let mut report = EvictionReport::default();

        let stats = match self.stats.get_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read cache stats; eviction skipped");
                return report;
            }
        };
        let over_size = stats.estimated_cache_size_mb > cfg.max_cache_size_mb;
        let over_items = stats.cache_items_count > cfg.max_cached_items;
        if !over_size && !over_items {
            return report;
        }
        if over_size {
            report.target_mb =
                stats.estimated_cache_size_mb - cfg.max_cache_size_mb * EVICTION_TARGET_RATIO;
        }
        if over_items {
            let keep = (cfg.max_cached_items as f64 * EVICTION_TARGET_RATIO) as u64;
            report.target_items = stats.cache_items_count.saturating_sub(keep);
        }

        if !self.store.supports_scan() {
            tracing::warn!(
                store = self.store.name(),
                "store cannot enumerate keys; eviction skipped"
            );
            return report;
        }

        let mut candidates = match scan(self.store.as_ref(), &self.keyspace).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "metadata scan failed; eviction aborted");
                report.aborted = true;
                return report;
            }
        };
        candidates.sort_by(|a, b| a.last_accessed().total_cmp(&b.last_accessed()));

        // entries another pass removed first still count toward the targets
        let (mut cleared, mut cleared_mb) = (0u64, 0.0);
        for entry in candidates {
            if cleared_mb >= report.target_mb && cleared >= report.target_items {
                break;
            }
            let removed = match self.remove(&entry.key).await {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::error!(key = %entry.key, error = %e, "eviction aborted");
                    report.aborted = true;
                    break;
                }
            };
            cleared += 1;
            cleared_mb += entry.size_mb();
            if !removed {
                tracing::debug!(key = %entry.key, "entry already gone");
                continue;
            }
            report.evicted += 1;
            report.reclaimed_mb += entry.size_mb();
            if let Err(e) = self.stats.record_eviction().await {
                tracing::warn!(error = %e, "eviction not counted");
            }
            tracing::debug!(key = %entry.key, size_mb = entry.size_mb(), "evicted cache entry");
        }

        if report.evicted > 0 {
            if let Err(e) = self
                .stats
                .adjust_size(-(report.evicted as i64), -report.reclaimed_mb)
                .await
            {
                tracing::warn!(error = %e, "size aggregate not updated after eviction");
            }
        }
        tracing::info!(
            evicted = report.evicted,
            reclaimed_mb = report.reclaimed_mb,
            aborted = report.aborted,
            "eviction pass finished"
        );
        report
    }

    /// Delete one entry. `Ok(false)` if its metadata was already gone.
    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        self.store.delete(&key.payload_key()).await?;
        self.store.delete(&key.metadata_key()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::metadata::CacheMetadata;
    use crate::config::CacheConfig;
    use crate::store::MemoryStore;

    async fn seed(store: &MemoryStore, digest: &str, size_mb: f64, last_accessed: f64) -> CacheKey {
        let key = CacheKey::new("", digest);
        let mut meta = CacheMetadata::new("llama", size_mb, 600);
        meta.last_accessed = last_accessed;
        store.set(&key.payload_key(), b"\"x\"", None).await.unwrap();
        store
            .set(&key.metadata_key(), &meta.to_bytes().unwrap(), None)
            .await
            .unwrap();
        key
    }

    fn manager(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> (EvictionManager, Arc<StatsRegistry>) {
        let config = SharedConfig::new(config);
        let ks = Keyspace::default();
        let stats = Arc::new(StatsRegistry::new(store.clone(), &ks, config.clone()));
        (EvictionManager::new(store, ks, stats.clone(), config), stats)
    }

    #[tokio::test]
    async fn under_cap_is_a_no_op() {
        let store = MemoryStore::new();
        let key = seed(&store, "a0", 1.0, 1.0).await;
        let (mgr, stats) = manager(Arc::new(store.clone()), CacheConfig::default());
        stats.adjust_size(1, 1.0).await.unwrap();
        let report = mgr.run().await;
        assert_eq!(report.evicted, 0);
        assert!(store.exists(&key.payload_key()).await.unwrap());
    }

    #[tokio::test]
    async fn evicts_oldest_first_until_target() {
        let store = MemoryStore::new();
        let oldest = seed(&store, "a0", 4.0, 1.0).await;
        let middle = seed(&store, "a1", 4.0, 2.0).await;
        let newest = seed(&store, "a2", 4.0, 3.0).await;
        let (mgr, stats) = manager(
            Arc::new(store.clone()),
            CacheConfig::default().with_max_cache_size_mb(10.0),
        );
        stats.adjust_size(3, 12.0).await.unwrap();

        // target: 12 - 8 = 4 MB, one entry
        let report = mgr.run().await;
        assert_eq!(report.evicted, 1);
        assert_eq!(report.reclaimed_mb, 4.0);
        assert!(!store.exists(&oldest.payload_key()).await.unwrap());
        assert!(store.exists(&middle.payload_key()).await.unwrap());
        assert!(store.exists(&newest.metadata_key()).await.unwrap());

        let after = stats.get_stats().await.unwrap();
        assert_eq!(after.evictions, 1);
        assert_eq!(after.cache_items_count, 2);
        assert_eq!(after.estimated_cache_size_mb, 8.0);
    }

    #[tokio::test]
    async fn corrupt_metadata_goes_first() {
        let store = MemoryStore::new();
        let good = seed(&store, "b0", 1.0, 1.0).await;
        let bad = CacheKey::new("", "b1");
        store.set(&bad.metadata_key(), b"{broken", None).await.unwrap();
        let (mgr, stats) = manager(
            Arc::new(store.clone()),
            CacheConfig::default().with_max_cached_items(1),
        );
        stats.adjust_size(2, 1.0).await.unwrap();

        // item target: 2 - floor(0.8) = 2
        let report = mgr.run().await;
        assert_eq!(report.target_items, 2);
        assert_eq!(report.evicted, 2);
        assert_eq!(report.reclaimed_mb, 1.0);
        assert!(!store.exists(&bad.metadata_key()).await.unwrap());
        assert!(!store.exists(&good.metadata_key()).await.unwrap());
    }

    #[tokio::test]
    async fn triggers_are_coalesced() {
        let store = MemoryStore::new();
        let (mgr, _) = manager(Arc::new(store), CacheConfig::default());
        let mgr = Arc::new(mgr);
        let first = mgr.trigger().expect("first trigger runs");
        assert!(mgr.is_running());
        assert!(mgr.trigger().is_none());
        first.await.unwrap();
        assert!(!mgr.is_running());
        assert!(mgr.trigger().is_some());
    }
}
