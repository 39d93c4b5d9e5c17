//! Cache-through wrapper around an inference engine.

use super::key::Parameters;
use super::response::ResponseCache;
use crate::telemetry::LatencyRecorder;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Produces a model response for a prompt. Failures should be
/// [`crate::Error::Inference`].
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn infer(&self, prompt: &str, model: &str, parameters: &Parameters) -> Result<Value>;
}

#[async_trait]
impl<E: InferenceEngine + ?Sized> InferenceEngine for Arc<E> {
    async fn infer(&self, prompt: &str, model: &str, parameters: &Parameters) -> Result<Value> {
        (**self).infer(prompt, model, parameters).await
    }
}

/// Per-request caching policy.
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    /// Bypass the cache entirely: no lookup and no store.
    pub skip_cache: bool,
    /// Explicit TTL for the stored response.
    pub ttl: Option<Duration>,
    /// Only store responses that took at least this long to produce.
    pub min_latency_to_cache: Option<Duration>,
}

impl CachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bypass() -> Self {
        Self {
            skip_cache: true,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_min_latency_to_cache(mut self, min: Duration) -> Self {
        self.min_latency_to_cache = Some(min);
        self
    }
}

/// Result of [`CachedInference::respond`].
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub response: Value,
    /// Served from the cache.
    pub cached: bool,
    /// Freshly produced and written to the cache.
    pub stored: bool,
}

/// Serves repeated prompts from a [`ResponseCache`] and falls through to the
/// engine on a miss. Every request, hit or miss, is timed by the
/// [`LatencyRecorder`].
pub struct CachedInference<E> {
    engine: E,
    cache: Arc<ResponseCache>,
    recorder: LatencyRecorder,
}

impl<E: InferenceEngine> CachedInference<E> {
    pub fn new(engine: E, cache: Arc<ResponseCache>, recorder: LatencyRecorder) -> Self {
        Self {
            engine,
            cache,
            recorder,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub async fn respond(
        &self,
        prompt: &str,
        model: &str,
        parameters: &Parameters,
        policy: &CachePolicy,
    ) -> Result<InferenceOutcome> {
        let mut timer = self.recorder.start(Some(model));
        let out = self.serve(prompt, model, parameters, policy).await;
        match &out {
            Ok(outcome) => {
                timer.set_cached(outcome.cached);
                if !outcome.cached {
                    if let Some((prompt_tokens, completion_tokens)) = usage(&outcome.response) {
                        timer.set_token_counts(prompt_tokens, completion_tokens);
                    }
                }
            }
            Err(_) => timer.mark_error(),
        }
        let _ = timer.finish();
        out
    }

    async fn serve(
        &self,
        prompt: &str,
        model: &str,
        parameters: &Parameters,
        policy: &CachePolicy,
    ) -> Result<InferenceOutcome> {
        if policy.skip_cache {
            let response = self.engine.infer(prompt, model, parameters).await?;
            return Ok(InferenceOutcome {
                response,
                cached: false,
                stored: false,
            });
        }

        if let Some(response) = self.cache.get::<Value>(prompt, model, parameters).await? {
            return Ok(InferenceOutcome {
                response,
                cached: true,
                stored: false,
            });
        }

        let started = Instant::now();
        let response = self.engine.infer(prompt, model, parameters).await?;
        let elapsed = started.elapsed();

        let stored = match policy.min_latency_to_cache {
            Some(min) if elapsed < min => {
                tracing::debug!(
                    model,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "fast response not cached"
                );
                false
            }
            _ => {
                self.cache
                    .put(prompt, model, &response, parameters, policy.ttl)
                    .await?
            }
        };
        Ok(InferenceOutcome {
            response,
            cached: false,
            stored,
        })
    }
}

/// `(prompt_tokens, completion_tokens)` from an OpenAI-style `usage` block.
fn usage(response: &Value) -> Option<(u64, u64)> {
    let usage = response.get("usage")?;
    let prompt = usage.get("prompt_tokens").and_then(Value::as_u64)?;
    let completion = usage
        .get("completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some((prompt, completion))
}
