//! Administrative view over the cache and its counters.

use crate::cache::{ResponseCache, SizeEstimate};
use crate::stats::StatsRecord;
use crate::telemetry::{PerformanceRecord, PerformanceRegistry};
use crate::utils::timestamp;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;

/// Point-in-time view of every shared counter.
#[derive(Debug, Clone, Serialize)]
pub struct AdminSnapshot {
    pub store: &'static str,
    pub enabled: bool,
    pub max_cache_size_mb: f64,
    pub cache: StatsRecord,
    /// Percent.
    pub hit_rate: f64,
    pub performance: PerformanceRecord,
    /// Seconds.
    pub average_latency: f64,
    pub taken_at: f64,
}

/// Inspection and maintenance operations for operators.
#[derive(Clone)]
pub struct CacheAdmin {
    cache: Arc<ResponseCache>,
    performance: Arc<PerformanceRegistry>,
}

impl CacheAdmin {
    pub fn new(cache: Arc<ResponseCache>, performance: Arc<PerformanceRegistry>) -> Self {
        Self { cache, performance }
    }

    pub async fn snapshot(&self) -> Result<AdminSnapshot> {
        let cfg = self.cache.config().load();
        let cache = self.cache.stats().get_stats().await?;
        let performance = self.performance.get_metrics().await?;
        Ok(AdminSnapshot {
            store: self.cache.store().name(),
            enabled: cfg.enabled,
            max_cache_size_mb: cfg.max_cache_size_mb,
            hit_rate: cache.hit_rate(),
            average_latency: performance.average_latency(),
            cache,
            performance,
            taken_at: timestamp(),
        })
    }

    pub async fn reset_stats(&self) -> Result<StatsRecord> {
        self.cache.stats().reset().await
    }

    pub async fn reset_performance(&self) -> Result<PerformanceRecord> {
        self.performance.reset().await
    }

    /// Delete entries for `model` (all entries for `None`); see
    /// [`ResponseCache::clear_for_model`].
    pub async fn clear(&self, model: Option<&str>) -> usize {
        self.cache.clear_for_model(model).await
    }

    pub async fn refresh_size_estimate(&self) -> Result<SizeEstimate> {
        self.cache.refresh_size_estimate().await
    }
}
