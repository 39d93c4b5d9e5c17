//! The response cache proper.

use super::eviction::EvictionManager;
use super::key::{CacheKey, CacheKeyCodec, Keyspace, Parameters};
use super::metadata::{scan, CacheMetadata};
use super::ttl;
use crate::config::{CacheConfig, SharedConfig};
use crate::scheduler::PeriodicTask;
use crate::stats::StatsRegistry;
use crate::store::KeyValueStore;
use crate::utils::size_mb;
use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Totals produced by [`ResponseCache::refresh_size_estimate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SizeEstimate {
    pub items: u64,
    pub size_mb: f64,
    /// Metadata records dropped because their payload had expired.
    pub stale_removed: usize,
}

/// Caches serialized model responses in a [`KeyValueStore`].
///
/// Each entry is a payload (with TTL) plus a metadata record (without TTL).
/// Lookups and stores never fail because of the store: outages degrade to a
/// miss or to "not cached" and are logged. Only key encoding errors reach the
/// caller.
///
/// The keyspace is fixed when the cache is built; every other
/// [`CacheConfig`] field is re-read on each call.
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    codec: CacheKeyCodec,
    stats: Arc<StatsRegistry>,
    eviction: Arc<EvictionManager>,
    config: SharedConfig,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: impl Into<SharedConfig>) -> Self {
        let config = config.into();
        let keyspace = Keyspace::new(config.load().namespace.clone());
        let stats = Arc::new(StatsRegistry::new(store.clone(), &keyspace, config.clone()));
        let eviction = Arc::new(EvictionManager::new(
            store.clone(),
            keyspace.clone(),
            stats.clone(),
            config.clone(),
        ));
        Self {
            store,
            codec: CacheKeyCodec::new(keyspace),
            stats,
            eviction,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn codec(&self) -> &CacheKeyCodec {
        &self.codec
    }

    pub fn stats(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    pub fn eviction(&self) -> &Arc<EvictionManager> {
        &self.eviction
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Look up a cached response.
    ///
    /// A hit bumps the entry's access count and may extend its TTL. Corrupt
    /// payloads are removed and reported as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        prompt: &str,
        model: &str,
        parameters: &Parameters,
    ) -> Result<Option<T>> {
        let key = self.codec.encode(prompt, model, parameters)?;
        let payload_key = key.payload_key();

        let bytes = match self.store.get(&payload_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.note_miss(model).await;
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache lookup failed; treating as miss");
                self.note_miss(model).await;
                return Ok(None);
            }
        };

        let value = match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "corrupt cache entry; treating as miss");
                self.discard(&key).await;
                self.note_miss(model).await;
                return Ok(None);
            }
        };

        self.touch(&key, model, &bytes).await;
        if let Err(e) = self.stats.record_hit(Some(model)).await {
            tracing::warn!(error = %e, "cache hit not counted");
        }
        tracing::debug!(key = %key, model, "cache hit");
        Ok(Some(value))
    }

    /// Store a response. Returns `Ok(false)` when caching is disabled or the
    /// write did not go through.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        prompt: &str,
        model: &str,
        response: &T,
        parameters: &Parameters,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let cfg = self.config.load();
        if !cfg.enabled {
            return Ok(false);
        }
        let key = self.codec.encode(prompt, model, parameters)?;
        let data = match serde_json::to_vec(response) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "response is not serializable; not cached");
                return Ok(false);
            }
        };
        let entry_mb = size_mb(data.len());

        let ttl = ttl::select_ttl(ttl, entry_mb, cfg.default_ttl, cfg.min_ttl);
        let previous = self.read_metadata(&key).await;

        let payload_key = key.payload_key();
        if let Err(e) = self.store.set(&payload_key, &data, Some(ttl)).await {
            tracing::warn!(key = %key, error = %e, "cache write failed");
            return Ok(false);
        }
        let metadata = CacheMetadata::new(model, entry_mb, ttl.as_secs());
        if let Err(e) = self.write_metadata(&key, &metadata).await {
            tracing::warn!(key = %key, error = %e, "metadata write failed; dropping payload");
            if let Err(e) = self.store.delete(&payload_key).await {
                tracing::warn!(key = %key, error = %e, "orphaned payload left until expiry");
            }
            return Ok(false);
        }

        let (items, delta_mb) = match previous {
            Some(old) => (0, entry_mb - old.size_mb),
            None => (1, entry_mb),
        };
        match self.stats.adjust_size(items, delta_mb).await {
            Ok(()) => self.maybe_evict(&cfg).await,
            Err(e) => tracing::warn!(error = %e, "size aggregate not updated"),
        }
        tracing::debug!(key = %key, model, size_mb = entry_mb, ttl_secs = ttl.as_secs(), "cached response");
        Ok(true)
    }

    /// Remove one entry. `Ok(true)` if anything was deleted; repeat calls
    /// return `Ok(false)`.
    pub async fn invalidate(
        &self,
        prompt: &str,
        model: &str,
        parameters: &Parameters,
    ) -> Result<bool> {
        let key = self.codec.encode(prompt, model, parameters)?;
        let metadata = self.read_metadata(&key).await;
        let payload_removed = self.delete_logged(&key.payload_key()).await;
        let metadata_removed = self.delete_logged(&key.metadata_key()).await;
        if let (true, Some(meta)) = (metadata_removed, metadata) {
            if let Err(e) = self.stats.adjust_size(-1, -meta.size_mb).await {
                tracing::warn!(error = %e, "size aggregate not updated");
            }
        }
        Ok(payload_removed || metadata_removed)
    }

    /// Delete every entry for `model`, or all entries when `model` is `None`.
    ///
    /// Statistics are reset afterwards whether or not anything was found.
    /// Returns `0` on stores that cannot enumerate keys.
    pub async fn clear_for_model(&self, model: Option<&str>) -> usize {
        let entries = if self.store.supports_scan() {
            match scan(self.store.as_ref(), self.codec.keyspace()).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, "metadata scan failed; nothing cleared");
                    Vec::new()
                }
            }
        } else {
            tracing::warn!(store = self.store.name(), "store cannot enumerate keys; nothing cleared");
            Vec::new()
        };

        let mut cleared = 0;
        for entry in entries {
            let matches = match model {
                None => true,
                Some(m) => entry.model() == Some(m),
            };
            if !matches {
                continue;
            }
            let payload = self.delete_logged(&entry.key.payload_key()).await;
            let metadata = self.delete_logged(&entry.key.metadata_key()).await;
            if payload || metadata {
                cleared += 1;
            }
        }

        if let Err(e) = self.stats.reset().await {
            tracing::warn!(error = %e, "stats reset failed");
        }
        tracing::info!(model = model.unwrap_or("*"), cleared, "cache cleared");
        cleared
    }

    /// Rebuild the size aggregate from the metadata records, dropping
    /// records whose payload has expired.
    pub async fn refresh_size_estimate(&self) -> Result<SizeEstimate> {
        if !self.store.supports_scan() {
            return Err(Error::Unsupported {
                operation: "refresh_size_estimate",
                backend: self.store.name(),
            });
        }
        let mut estimate = SizeEstimate::default();
        for entry in scan(self.store.as_ref(), self.codec.keyspace()).await? {
            let payload_key = entry.key.payload_key();
            match &entry.metadata {
                Some(meta) => {
                    if !self.store.exists(&payload_key).await? {
                        self.store.delete(&entry.key.metadata_key()).await?;
                        estimate.stale_removed += 1;
                        continue;
                    }
                    estimate.items += 1;
                    estimate.size_mb += meta.size_mb;
                }
                None => match self.store.get(&payload_key).await? {
                    Some(bytes) => {
                        estimate.items += 1;
                        estimate.size_mb += size_mb(bytes.len());
                    }
                    None => {
                        self.store.delete(&entry.key.metadata_key()).await?;
                        estimate.stale_removed += 1;
                    }
                },
            }
        }
        self.stats
            .set_size_estimate(estimate.items, estimate.size_mb)
            .await?;
        tracing::info!(
            items = estimate.items,
            size_mb = estimate.size_mb,
            stale_removed = estimate.stale_removed,
            "cache size estimate refreshed"
        );
        Ok(estimate)
    }

    /// Periodically reconcile the size aggregate and run eviction.
    pub fn spawn_maintenance(self: &Arc<Self>, period: Duration) -> PeriodicTask {
        let cache = Arc::clone(self);
        PeriodicTask::spawn("cache-maintenance", period, move || {
            let cache = cache.clone();
            async move {
                if cache.store.supports_scan() {
                    if let Err(e) = cache.refresh_size_estimate().await {
                        tracing::warn!(error = %e, "size refresh failed");
                    }
                }
                cache.eviction.run().await;
            }
        })
    }

    async fn note_miss(&self, model: &str) {
        if let Err(e) = self.stats.record_miss(Some(model)).await {
            tracing::warn!(error = %e, "cache miss not counted");
        }
    }

    /// Start a background pass if the aggregate, new entry included, is over a cap.
    async fn maybe_evict(&self, cfg: &CacheConfig) {
        let stats = match self.stats.get_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::debug!(error = %e, "stats unavailable; eviction check skipped");
                return;
            }
        };
        if stats.estimated_cache_size_mb > cfg.max_cache_size_mb
            || stats.cache_items_count > cfg.max_cached_items
        {
            let _ = self.eviction.trigger();
        }
    }

    /// Metadata for `key`, or `None` when absent, unreadable or unreachable.
    async fn read_metadata(&self, key: &CacheKey) -> Option<CacheMetadata> {
        match self.store.get(&key.metadata_key()).await {
            Ok(Some(raw)) => CacheMetadata::from_bytes(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "metadata unavailable");
                None
            }
        }
    }

    async fn write_metadata(&self, key: &CacheKey, metadata: &CacheMetadata) -> Result<()> {
        let bytes = metadata.to_bytes()?;
        self.store.set(&key.metadata_key(), &bytes, None).await
    }

    async fn delete_logged(&self, store_key: &str) -> bool {
        match self.store.delete(store_key).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(key = store_key, error = %e, "delete failed");
                false
            }
        }
    }

    /// Drop a corrupt entry and its share of the size aggregate.
    async fn discard(&self, key: &CacheKey) {
        let metadata = self.read_metadata(key).await;
        self.delete_logged(&key.payload_key()).await;
        let removed = self.delete_logged(&key.metadata_key()).await;
        if let (true, Some(meta)) = (removed, metadata) {
            if let Err(e) = self.stats.adjust_size(-1, -meta.size_mb).await {
                tracing::warn!(error = %e, "size aggregate not updated");
            }
        }
    }

    /// Hit bookkeeping: bump the access count, extend the TTL of hot entries.
    async fn touch(&self, key: &CacheKey, model: &str, payload: &[u8]) {
        let metadata_key = key.metadata_key();
        let mut metadata = match self.store.get(&metadata_key).await {
            Ok(Some(raw)) => match CacheMetadata::from_bytes(&raw) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "rebuilding unreadable metadata");
                    self.recovered_metadata(model, payload)
                }
            },
            Ok(None) => self.recovered_metadata(model, payload),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "metadata unavailable; hit not tracked");
                return;
            }
        };
        metadata.touch();

        if ttl::should_extend(key, metadata.access_count) {
            let extended = ttl::extended_ttl(metadata.original_ttl, metadata.access_count);
            match self
                .store
                .set(&key.payload_key(), payload, Some(Duration::from_secs(extended)))
                .await
            {
                Ok(()) => {
                    tracing::debug!(key = %key, ttl_secs = extended, "extended cache entry TTL");
                    metadata.current_ttl = extended;
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "TTL extension failed"),
            }
        }

        if let Err(e) = self.write_metadata(key, &metadata).await {
            tracing::warn!(key = %key, error = %e, "metadata update failed");
        }
    }

    fn recovered_metadata(&self, model: &str, payload: &[u8]) -> CacheMetadata {
        let cfg = self.config.load();
        CacheMetadata::recovered(model, size_mb(payload.len()), cfg.default_ttl.as_secs())
    }
}
