//! Request latency and throughput accounting.

use super::sink::LatencySample;
use crate::cache::key::Keyspace;
use crate::config::SharedConfig;
use crate::stats::SharedRecord;
use crate::store::KeyValueStore;
use crate::utils::timestamp;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceRecord {
    pub total_requests: u64,
    /// Sum of request latencies in seconds.
    pub total_latency: f64,
    pub cached_responses: u64,
    pub offloaded: u64,
    pub errors: u64,
    pub requests_by_model: BTreeMap<String, u64>,
    pub token_usage: TokenUsage,
    pub tokens_by_model: BTreeMap<String, u64>,
    pub last_reset: f64,
}

impl Default for PerformanceRecord {
    fn default() -> Self {
        Self {
            total_requests: 0,
            total_latency: 0.0,
            cached_responses: 0,
            offloaded: 0,
            errors: 0,
            requests_by_model: BTreeMap::new(),
            token_usage: TokenUsage::default(),
            tokens_by_model: BTreeMap::new(),
            last_reset: timestamp(),
        }
    }
}

impl PerformanceRecord {
    /// Mean latency in seconds; 0 before the first request.
    pub fn average_latency(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_latency / self.total_requests as f64
        }
    }

    /// Share of requests served from cache, in percent.
    pub fn cached_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cached_responses as f64 / self.total_requests as f64 * 100.0
        }
    }

    fn apply(&mut self, sample: &LatencySample) {
        self.total_requests += 1;
        self.total_latency += sample.latency.max(0.0);
        if sample.cached {
            self.cached_responses += 1;
        }
        if sample.offloaded {
            self.offloaded += 1;
        }
        if sample.error {
            self.errors += 1;
        }
        if let Some(ref m) = sample.model {
            *self.requests_by_model.entry(m.clone()).or_default() += 1;
        }
        self.add_tokens(
            sample.prompt_tokens,
            sample.completion_tokens,
            sample.model.as_deref(),
        );
    }

    fn add_tokens(&mut self, prompt: u64, completion: u64, model: Option<&str>) {
        let total = prompt + completion;
        self.token_usage.prompt += prompt;
        self.token_usage.completion += completion;
        self.token_usage.total += total;
        if let (Some(m), true) = (model, total > 0) {
            *self.tokens_by_model.entry(m.to_string()).or_default() += total;
        }
    }
}

/// Store-backed [`PerformanceRecord`], updated under its own lock.
pub struct PerformanceRegistry {
    record: SharedRecord<PerformanceRecord>,
    config: SharedConfig,
}

impl PerformanceRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, keyspace: &Keyspace, config: SharedConfig) -> Self {
        Self {
            record: SharedRecord::new(
                store,
                keyspace.performance_key(),
                keyspace.performance_lock_key(),
            ),
            config,
        }
    }

    pub async fn apply(&self, sample: &LatencySample) -> Result<()> {
        let cfg = self.config.load();
        self.record.update(&cfg.lock, |r| r.apply(sample)).await
    }

    pub async fn track_token_usage(
        &self,
        prompt_tokens: u64,
        completion_tokens: u64,
        model: Option<&str>,
    ) -> Result<()> {
        let cfg = self.config.load();
        self.record
            .update(&cfg.lock, |r| {
                r.add_tokens(prompt_tokens, completion_tokens, model)
            })
            .await
    }

    pub async fn get_metrics(&self) -> Result<PerformanceRecord> {
        self.record.read().await
    }

    pub async fn reset(&self) -> Result<PerformanceRecord> {
        let fresh = PerformanceRecord::default();
        self.record.overwrite(&fresh).await?;
        tracing::info!("performance metrics reset");
        Ok(fresh)
    }
}
