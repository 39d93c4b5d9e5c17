//! Destinations for latency samples.

use crate::utils::timestamp;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One timed operation, as reported by a [`super::LatencyTimer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub model: Option<String>,
    /// Wall-clock seconds.
    pub latency: f64,
    /// Served from cache.
    pub cached: bool,
    /// Handled by a remote/serverless backend.
    pub offloaded: bool,
    pub error: bool,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub timestamp: f64,
}

impl LatencySample {
    pub fn new(model: Option<String>, latency: f64) -> Self {
        Self {
            model,
            latency,
            cached: false,
            offloaded: false,
            error: false,
            prompt_tokens: 0,
            completion_tokens: 0,
            timestamp: timestamp(),
        }
    }

    /// Expand the sample into dimensioned datums for a remote metrics service.
    pub fn metric_data(&self, environment: &str) -> Vec<MetricDatum> {
        let mut dimensions = vec![("Environment".to_string(), environment.to_string())];
        if let Some(ref m) = self.model {
            dimensions.push(("Model".to_string(), m.clone()));
        }
        let datum = |name: &str, value: f64, unit: MetricUnit| MetricDatum {
            name: name.to_string(),
            value,
            unit,
            dimensions: dimensions.clone(),
        };
        let mut data = vec![
            datum("Latency", self.latency, MetricUnit::Seconds),
            datum("RequestCount", 1.0, MetricUnit::Count),
        ];
        if self.cached {
            data.push(datum("CacheHit", 1.0, MetricUnit::Count));
        }
        if self.offloaded {
            data.push(datum("Offloaded", 1.0, MetricUnit::Count));
        }
        if self.error {
            data.push(datum("Error", 1.0, MetricUnit::Count));
        }
        data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    Seconds,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub dimensions: Vec<(String, String)>,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(&self, sample: &LatencySample) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Default sink: drops everything.
pub struct NoopMetricsSink;

#[async_trait]
impl MetricsSink for NoopMetricsSink {
    async fn publish(&self, _: &LatencySample) -> Result<()> {
        Ok(())
    }
}

pub fn noop_sink() -> Arc<dyn MetricsSink> {
    Arc::new(NoopMetricsSink)
}

/// Bounded in-memory sink for testing.
pub struct InMemoryMetricsSink {
    samples: Mutex<VecDeque<LatencySample>>,
    max_samples: usize,
}

impl InMemoryMetricsSink {
    pub fn new(max: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            max_samples: max.max(1),
        }
    }
    pub fn samples(&self) -> Vec<LatencySample> {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
    pub fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn clear(&self) {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn publish(&self, sample: &LatencySample) -> Result<()> {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples.push_back(sample.clone());
        while samples.len() > self.max_samples {
            samples.pop_front();
        }
        Ok(())
    }
}

/// Emits every sample as a structured `tracing` event.
pub struct TracingMetricsSink {
    environment: String,
}

impl TracingMetricsSink {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }
}

impl Default for TracingMetricsSink {
    fn default() -> Self {
        Self::new("development")
    }
}

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn publish(&self, sample: &LatencySample) -> Result<()> {
        tracing::info!(
            target: "llm_response_cache::metrics",
            environment = %self.environment,
            model = sample.model.as_deref().unwrap_or("-"),
            latency_secs = sample.latency,
            cached = sample.cached,
            offloaded = sample.offloaded,
            error = sample.error,
            "request latency"
        );
        Ok(())
    }
}

/// Fans each sample out to several sinks. Individual sink failures are
/// logged and do not stop the others.
#[derive(Default)]
pub struct CompositeMetricsSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl CompositeMetricsSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }
    pub fn add_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl MetricsSink for CompositeMetricsSink {
    async fn publish(&self, sample: &LatencySample) -> Result<()> {
        let results =
            futures::future::join_all(self.sinks.iter().map(|s| s.publish(sample))).await;
        for e in results.into_iter().filter_map(|r| r.err()) {
            tracing::warn!(error = %e, "metrics sink rejected sample");
        }
        Ok(())
    }
    async fn close(&self) -> Result<()> {
        for s in &self.sinks {
            let _ = s.close().await;
        }
        Ok(())
    }
}
