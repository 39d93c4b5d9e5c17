//! Hit/miss/eviction counters and the aggregate size estimate.

use super::record::SharedRecord;
use crate::cache::key::Keyspace;
use crate::config::SharedConfig;
use crate::store::KeyValueStore;
use crate::utils::timestamp;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCounters {
    pub hits: u64,
    pub misses: u64,
}

/// Global cache statistics.
///
/// `cache_hits + cache_misses == total_cache_requests` holds after every
/// completed update; the size aggregate never drops below zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsRecord {
    pub total_cache_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub cache_items_count: u64,
    pub estimated_cache_size_mb: f64,
    pub last_reset: f64,
    pub by_model: BTreeMap<String, ModelCounters>,
}

impl Default for StatsRecord {
    fn default() -> Self {
        Self {
            total_cache_requests: 0,
            cache_hits: 0,
            cache_misses: 0,
            evictions: 0,
            cache_items_count: 0,
            estimated_cache_size_mb: 0.0,
            last_reset: timestamp(),
            by_model: BTreeMap::new(),
        }
    }
}

impl StatsRecord {
    /// Hits as a percentage of all lookups; 0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        if self.total_cache_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_cache_requests as f64 * 100.0
        }
    }

    fn record_lookup(&mut self, hit: bool, model: Option<&str>) {
        self.total_cache_requests += 1;
        if hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
        if let Some(m) = model {
            let counters = self.by_model.entry(m.to_string()).or_default();
            if hit {
                counters.hits += 1;
            } else {
                counters.misses += 1;
            }
        }
    }

    fn adjust_size(&mut self, items_delta: i64, size_delta_mb: f64) {
        self.cache_items_count = if items_delta >= 0 {
            self.cache_items_count.saturating_add(items_delta as u64)
        } else {
            self.cache_items_count
                .saturating_sub(items_delta.unsigned_abs())
        };
        self.estimated_cache_size_mb = (self.estimated_cache_size_mb + size_delta_mb).max(0.0);
    }
}

/// Store-backed statistics shared by every cache instance in the keyspace.
///
/// Mutations serialize on a distributed lock. When the lock cannot be taken
/// within the configured budget the update is dropped and
/// [`crate::Error::LockTimeout`] is returned for the caller to log.
pub struct StatsRegistry {
    record: SharedRecord<StatsRecord>,
    config: SharedConfig,
}

impl StatsRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, keyspace: &Keyspace, config: SharedConfig) -> Self {
        Self {
            record: SharedRecord::new(store, keyspace.stats_key(), keyspace.stats_lock_key()),
            config,
        }
    }

    pub async fn record_hit(&self, model: Option<&str>) -> Result<()> {
        let cfg = self.config.load();
        self.record
            .update(&cfg.lock, |s| s.record_lookup(true, model))
            .await
    }

    pub async fn record_miss(&self, model: Option<&str>) -> Result<()> {
        let cfg = self.config.load();
        self.record
            .update(&cfg.lock, |s| s.record_lookup(false, model))
            .await
    }

    pub async fn record_eviction(&self) -> Result<()> {
        let cfg = self.config.load();
        self.record.update(&cfg.lock, |s| s.evictions += 1).await
    }

    /// Shift the aggregate item count and size; both clamp at zero.
    pub async fn adjust_size(&self, items_delta: i64, size_delta_mb: f64) -> Result<()> {
        let cfg = self.config.load();
        self.record
            .update(&cfg.lock, |s| s.adjust_size(items_delta, size_delta_mb))
            .await
    }

    /// Overwrite the aggregate with a freshly measured estimate.
    pub async fn set_size_estimate(&self, items: u64, size_mb: f64) -> Result<()> {
        let cfg = self.config.load();
        self.record
            .update(&cfg.lock, |s| {
                s.cache_items_count = items;
                s.estimated_cache_size_mb = size_mb.max(0.0);
            })
            .await
    }

    /// Unlocked, eventually consistent snapshot. Observability only.
    pub async fn get_stats(&self) -> Result<StatsRecord> {
        self.record.read().await
    }

    /// Zero every counter and stamp `last_reset`.
    pub async fn reset(&self) -> Result<StatsRecord> {
        let fresh = StatsRecord::default();
        self.record.overwrite(&fresh).await?;
        tracing::info!("cache statistics reset");
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::store::MemoryStore;

    fn registry() -> StatsRegistry {
        StatsRegistry::new(
            Arc::new(MemoryStore::new()),
            &Keyspace::default(),
            SharedConfig::new(CacheConfig::default()),
        )
    }

    #[tokio::test]
    async fn lookups_keep_totals_consistent() {
        let reg = registry();
        reg.record_hit(Some("llama")).await.unwrap();
        reg.record_miss(Some("llama")).await.unwrap();
        reg.record_miss(None).await.unwrap();
        let s = reg.get_stats().await.unwrap();
        assert_eq!(s.total_cache_requests, 3);
        assert_eq!(s.cache_hits + s.cache_misses, s.total_cache_requests);
        assert_eq!(s.by_model["llama"], ModelCounters { hits: 1, misses: 1 });
        assert!((s.hit_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn size_adjustments_clamp_at_zero() {
        let reg = registry();
        reg.adjust_size(2, 1.5).await.unwrap();
        reg.adjust_size(-5, -10.0).await.unwrap();
        let s = reg.get_stats().await.unwrap();
        assert_eq!(s.cache_items_count, 0);
        assert_eq!(s.estimated_cache_size_mb, 0.0);
    }

    #[tokio::test]
    async fn reset_zeroes_counters() {
        let reg = registry();
        reg.record_hit(None).await.unwrap();
        reg.record_eviction().await.unwrap();
        reg.set_size_estimate(4, 2.0).await.unwrap();
        let before = reg.get_stats().await.unwrap();
        assert_eq!(before.evictions, 1);
        assert_eq!(before.cache_items_count, 4);
        let fresh = reg.reset().await.unwrap();
        assert_eq!(fresh.total_cache_requests, 0);
        let after = reg.get_stats().await.unwrap();
        assert_eq!(after.evictions, 0);
        assert_eq!(after.cache_items_count, 0);
        assert!(after.last_reset >= before.last_reset);
    }

    #[test]
    fn hit_rate_guards_zero_requests() {
        assert_eq!(StatsRecord::default().hit_rate(), 0.0);
    }
}
