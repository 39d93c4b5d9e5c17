//! Key-value store abstraction.
//!
//! Every piece of shared state (payloads, metadata, stats records, locks)
//! lives in a [`KeyValueStore`]. The trait mirrors the primitives a generic
//! cache backend offers: plain `get`/`set`/`delete`, an atomic
//! create-if-absent `add` and a best-effort `keys` scan. There are no
//! transactions and no compare-and-swap beyond `add`.
//!
//! | Store | Description |
//! |-------|-------------|
//! | [`MemoryStore`] | In-process map with TTL expiry and glob scans |
//! | [`NullStore`] | Stores nothing, cannot scan |

mod memory;
mod null;

pub use memory::MemoryStore;
pub use null::NullStore;

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Unconditional write. `ttl = None` means the entry never expires.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Atomic create-if-absent. Returns `false` when a live entry exists.
    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Whether a live entry exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Returns `true` if something was removed. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keys matching a glob pattern (`*` wildcard). Backends without scan
    /// support return [`crate::Error::Unsupported`].
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Whether [`KeyValueStore::keys`] is available.
    fn supports_scan(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Compile a `*`-glob into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<regex::Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    regex::Regex::new(&format!("^{}$", body)).map_err(|e| {
        crate::Error::runtime_with_context(
            "invalid key pattern",
            crate::ErrorContext::new()
                .with_field_path(pattern)
                .with_details(e.to_string()),
        )
    })
}
