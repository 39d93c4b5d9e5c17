//! Scoped timing of cache and inference operations.

use super::performance::PerformanceRegistry;
use super::sink::{LatencySample, MetricsSink};
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Hands finished samples to the [`PerformanceRegistry`] and a [`MetricsSink`].
///
/// Recording never blocks the timed operation: each sample is applied on a
/// spawned task, and failures there are logged and dropped.
#[derive(Clone)]
pub struct LatencyRecorder {
    performance: Arc<PerformanceRegistry>,
    sink: Arc<dyn MetricsSink>,
}

impl LatencyRecorder {
    pub fn new(performance: Arc<PerformanceRegistry>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { performance, sink }
    }

    pub fn performance(&self) -> &Arc<PerformanceRegistry> {
        &self.performance
    }

    /// Start timing an operation for `model`.
    pub fn start(&self, model: Option<&str>) -> LatencyTimer {
        LatencyTimer {
            recorder: self.clone(),
            started: Instant::now(),
            model: model.map(str::to_string),
            cached: false,
            offloaded: false,
            error: false,
            prompt_tokens: 0,
            completion_tokens: 0,
            finished: false,
        }
    }

    /// Await `fut` inside `timer`. An `Err` marks the sample as an error and
    /// is returned unchanged.
    pub async fn instrument<T, Fut>(&self, mut timer: LatencyTimer, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let out = fut.await;
        if out.is_err() {
            timer.mark_error();
        }
        let _ = timer.finish();
        out
    }

    /// Apply a sample in the current task.
    pub async fn record(&self, sample: &LatencySample) {
        if let Err(e) = self.performance.apply(sample).await {
            tracing::warn!(error = %e, "dropping performance update");
        }
        if let Err(e) = self.sink.publish(sample).await {
            tracing::warn!(error = %e, "metrics sink rejected sample");
        }
    }

    /// Apply a sample on a background task. Returns `None` when no tokio
    /// runtime is available, in which case the sample is dropped.
    pub fn dispatch(&self, sample: LatencySample) -> Option<JoinHandle<()>> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let recorder = self.clone();
                Some(handle.spawn(async move { recorder.record(&sample).await }))
            }
            Err(_) => {
                tracing::warn!("no tokio runtime; latency sample dropped");
                None
            }
        }
    }
}

/// A running measurement. Finishing it, or dropping it, dispatches the sample.
#[must_use = "dropping the timer immediately records a near-zero latency"]
pub struct LatencyTimer {
    recorder: LatencyRecorder,
    started: Instant,
    model: Option<String>,
    cached: bool,
    offloaded: bool,
    error: bool,
    prompt_tokens: u64,
    completion_tokens: u64,
    finished: bool,
}

impl LatencyTimer {
    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn offloaded(mut self, offloaded: bool) -> Self {
        self.offloaded = offloaded;
        self
    }

    pub fn set_cached(&mut self, cached: bool) {
        self.cached = cached;
    }

    pub fn set_offloaded(&mut self, offloaded: bool) {
        self.offloaded = offloaded;
    }

    pub fn mark_error(&mut self) {
        self.error = true;
    }

    pub fn set_token_counts(&mut self, prompt_tokens: u64, completion_tokens: u64) {
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens = completion_tokens;
    }

    /// Stop the clock and dispatch the sample.
    pub fn finish(mut self) -> Option<JoinHandle<()>> {
        let sample = self.take_sample();
        self.recorder.dispatch(sample)
    }

    fn take_sample(&mut self) -> LatencySample {
        self.finished = true;
        let mut sample = LatencySample::new(self.model.take(), self.started.elapsed().as_secs_f64());
        sample.cached = self.cached;
        sample.offloaded = self.offloaded;
        sample.error = self.error;
        sample.prompt_tokens = self.prompt_tokens;
        sample.completion_tokens = self.completion_tokens;
        sample
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        if !self.finished {
            let sample = self.take_sample();
            let _ = self.recorder.dispatch(sample);
        }
    }
}
