use crate::admin::CacheAdmin;
use crate::cache::{CachedInference, InferenceEngine, ResponseCache};
use crate::config::{CacheConfig, SharedConfig};
use crate::store::{KeyValueStore, MemoryStore};
use crate::telemetry::{noop_sink, LatencyRecorder, MetricsSink, PerformanceRegistry};
use crate::Result;
use std::sync::Arc;

/// The cache, its telemetry and its admin surface wired to one store.
///
/// Build once per process and share by reference or clone.
#[derive(Clone)]
pub struct CacheStack {
    pub cache: Arc<ResponseCache>,
    pub performance: Arc<PerformanceRegistry>,
    pub recorder: LatencyRecorder,
    pub admin: CacheAdmin,
    pub config: SharedConfig,
}

impl CacheStack {
    pub fn builder() -> CacheStackBuilder {
        CacheStackBuilder::new()
    }

    /// Wrap `engine` with this stack's cache and latency recorder.
    pub fn cached<E: InferenceEngine>(&self, engine: E) -> CachedInference<E> {
        CachedInference::new(engine, self.cache.clone(), self.recorder.clone())
    }
}

/// Builder for [`CacheStack`].
///
/// Defaults: an in-process [`MemoryStore`], [`CacheConfig::default`] and a
/// no-op metrics sink.
pub struct CacheStackBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    config: Option<CacheConfig>,
    shared: Option<SharedConfig>,
    sink: Arc<dyn MetricsSink>,
}

impl CacheStackBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            config: None,
            shared: None,
            sink: noop_sink(),
        }
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share an existing hot-swappable handle instead of a fresh one.
    pub fn shared_config(mut self, config: SharedConfig) -> Self {
        self.shared = Some(config);
        self
    }

    /// Inject a metrics sink. Default is a no-op sink.
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validates the configuration before wiring anything.
    pub fn build(self) -> Result<CacheStack> {
        let config = match (self.shared, self.config) {
            (Some(shared), Some(config)) => {
                shared.store(config)?;
                shared
            }
            (Some(shared), None) => {
                shared.load().validate()?;
                shared
            }
            (None, config) => {
                let config = config.unwrap_or_default();
                config.validate()?;
                SharedConfig::new(config)
            }
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);

        let cache = Arc::new(ResponseCache::new(store.clone(), config.clone()));
        let performance = Arc::new(PerformanceRegistry::new(
            store,
            cache.codec().keyspace(),
            config.clone(),
        ));
        let recorder = LatencyRecorder::new(performance.clone(), self.sink);
        let admin = CacheAdmin::new(cache.clone(), performance.clone());
        tracing::debug!(
            store = cache.store().name(),
            namespace = cache.codec().keyspace().namespace(),
            "cache stack ready"
        );
        Ok(CacheStack {
            cache,
            performance,
            recorder,
            admin,
            config,
        })
    }
}

impl Default for CacheStackBuilder {
    fn default() -> Self {
        Self::new()
    }
}
