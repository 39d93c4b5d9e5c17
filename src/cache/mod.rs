//! # Response Caching Module
//!
//! Caches model responses keyed by a fingerprint of the request, so repeated
//! identical requests skip inference.
//!
//! ## Overview
//!
//! Each entry is two store records: the serialized payload (with a TTL) and
//! a [`CacheMetadata`] record (size, access count, TTLs) that drives
//! adaptive TTL extension and LRU eviction. Aggregate hit/miss and size
//! counters live in a shared [`crate::stats::StatsRegistry`].
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | `get` / `put` / `invalidate` / `clear_for_model` |
//! | [`CacheKeyCodec`] | Deterministic SHA-256 request fingerprint |
//! | [`EvictionManager`] | LRU eviction down to 80% of the caps |
//! | [`CachedInference`] | Cache-through wrapper over an [`InferenceEngine`] |
//! | [`is_similar_prompt`] | Lexical prompt similarity |
//!
//! ## Example
//!
//! ```rust,no_run
//! use llm_response_cache::cache::{Parameters, ResponseCache};
//! use llm_response_cache::config::CacheConfig;
//! use llm_response_cache::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn demo() -> llm_response_cache::Result<()> {
//! let cache = ResponseCache::new(Arc::new(MemoryStore::new()), CacheConfig::default());
//! let params = Parameters::new();
//! cache.put("hello", "llama-3-8b", &"hi there", &params, None).await?;
//! let hit: Option<String> = cache.get("hello", "llama-3-8b", &params).await?;
//! assert_eq!(hit.as_deref(), Some("hi there"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Cache Key Generation
//!
//! Keys hash the prompt, the model and a fixed allow-list of sampling
//! parameters ([`KEY_PARAMETERS`]). Other parameters never split the cache.

mod cached;
mod eviction;
pub(crate) mod key;
pub(crate) mod metadata;
mod response;
mod similarity;
pub mod ttl;

pub use cached::{CachePolicy, CachedInference, InferenceEngine, InferenceOutcome};
pub use eviction::{EvictionManager, EvictionReport, EVICTION_TARGET_RATIO};
pub use key::{CacheKey, CacheKeyCodec, Keyspace, Parameters, KEY_PARAMETERS};
pub use metadata::CacheMetadata;
pub use response::{ResponseCache, SizeEstimate};
pub use similarity::{is_similar_prompt, DEFAULT_SIMILARITY_THRESHOLD};
