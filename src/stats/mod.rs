//! Store-backed statistics.
//!
//! The key-value store is the only authority over shared state, so counters
//! are JSON records in the store rather than process-local variables. Every
//! mutation runs a read-modify-write cycle under a [`DistributedLock`] built
//! from the store's atomic `add`.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`StatsRegistry`] | Hit/miss/eviction counters and aggregate cache size |
//! | [`SharedRecord`] | Generic locked record, also used for performance metrics |
//! | [`DistributedLock`] | TTL-bounded mutex with exponential backoff |

pub mod lock;
pub mod record;
pub mod registry;

pub use lock::{DistributedLock, LockToken};
pub use record::SharedRecord;
pub use registry::{ModelCounters, StatsRecord, StatsRegistry};
