//! Latency and throughput telemetry.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`LatencyRecorder`] | Scoped timers around cache lookups and inference calls |
//! | [`PerformanceRegistry`] | Store-backed request/latency/token counters |
//! | [`MetricsSink`] | Trait for external metrics destinations |
//! | [`NoopMetricsSink`] | Default no-op sink |
//! | [`InMemoryMetricsSink`] | Bounded in-memory sink for testing |
//! | [`TracingMetricsSink`] | Emits samples as `tracing` events |
//! | [`CompositeMetricsSink`] | Multi-destination composite sink |
//!
//! ```rust,no_run
//! use llm_response_cache::telemetry::{LatencyRecorder, PerformanceRegistry, noop_sink};
//! # async fn demo(perf: std::sync::Arc<PerformanceRegistry>) {
//! let recorder = LatencyRecorder::new(perf, noop_sink());
//! let timer = recorder.start(Some("llama-3-8b")).cached(true);
//! // ... serve the request ...
//! timer.finish();
//! # }
//! ```

mod latency;
mod performance;
mod sink;

pub use latency::{LatencyRecorder, LatencyTimer};
pub use performance::{PerformanceRecord, PerformanceRegistry, TokenUsage};
pub use sink::{
    noop_sink, CompositeMetricsSink, InMemoryMetricsSink, LatencySample, MetricDatum,
    MetricUnit, MetricsSink, NoopMetricsSink, TracingMetricsSink,
};
