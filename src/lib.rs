//! # llm-response-cache
//!
//! Response cache for LLM inference backed by a generic key-value store.
//!
//! ## Overview
//!
//! Identical requests (same prompt, model and sampling parameters) are served
//! from a shared store instead of re-running inference. Entries carry a TTL
//! that scales down for large payloads and stretches for hot keys; an LRU
//! pass keeps the cache under a size and item cap. Hit/miss counters and
//! latency metrics live in the same store, so every process sharing it sees
//! one consistent set of numbers.
//!
//! ## Core Properties
//!
//! - **Store-Agnostic**: everything goes through [`store::KeyValueStore`]
//! - **Non-Fatal**: store outages degrade to misses; only key encoding errors surface
//! - **Hot Config**: [`config::SharedConfig`] changes apply on the next operation
//! - **Multi-Process Safe**: counters update under a store-level lock
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_response_cache::{CacheStack, CachePolicy, InferenceEngine, Parameters};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl InferenceEngine for Echo {
//!     async fn infer(&self, prompt: &str, _: &str, _: &Parameters) -> llm_response_cache::Result<Value> {
//!         Ok(json!({ "text": prompt }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> llm_response_cache::Result<()> {
//!     let stack = CacheStack::builder().build()?;
//!     let engine = stack.cached(Echo);
//!     let params = Parameters::new();
//!     let first = engine.respond("hi", "llama-3-8b", &params, &CachePolicy::new()).await?;
//!     let second = engine.respond("hi", "llama-3-8b", &params, &CachePolicy::new()).await?;
//!     assert!(!first.cached && second.cached);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Response cache, key codec, TTL policy, eviction |
//! | [`stats`] | Store-backed counters and the distributed lock |
//! | [`telemetry`] | Latency timers, performance counters, metrics sinks |
//! | [`store`] | Key-value store trait and in-process stores |
//! | [`admin`] | Snapshot, reset and clear operations |
//! | [`config`] | Configuration and the hot-swappable handle |
//! | [`scheduler`] | Periodic background tasks |

pub mod admin;
mod builder;
pub mod cache;
pub mod config;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod utils;

// Re-export main types for convenience
pub use admin::{AdminSnapshot, CacheAdmin};
pub use builder::{CacheStack, CacheStackBuilder};
pub use cache::{
    CachePolicy, CachedInference, InferenceEngine, InferenceOutcome, Parameters, ResponseCache,
};
pub use config::{CacheConfig, LockConfig, SharedConfig};
pub use stats::{StatsRecord, StatsRegistry};
pub use store::{KeyValueStore, MemoryStore, NullStore};
pub use telemetry::{LatencyRecorder, MetricsSink, PerformanceRecord, PerformanceRegistry};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
