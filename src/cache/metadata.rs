//! Per-entry bookkeeping stored next to each cached payload.

use super::key::{CacheKey, Keyspace};
use crate::store::KeyValueStore;
use crate::utils::timestamp;
use serde::{Deserialize, Serialize};

/// Metadata record for one cache entry.
///
/// Lives under the entry's metadata key without an expiry, so it can outlive
/// its payload. Readers reconcile against the payload: metadata whose payload
/// is gone is stale and is removed by the next scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub model: String,
    pub created: f64,
    pub last_accessed: f64,
    pub access_count: u64,
    pub size_mb: f64,
    /// Seconds.
    pub original_ttl: u64,
    /// Seconds; grows past `original_ttl` when the entry is hot.
    pub current_ttl: u64,
}

impl CacheMetadata {
    /// Metadata for a freshly stored entry.
    pub fn new(model: impl Into<String>, size_mb: f64, ttl_secs: u64) -> Self {
        let now = timestamp();
        Self {
            model: model.into(),
            created: now,
            last_accessed: now,
            access_count: 1,
            size_mb,
            original_ttl: ttl_secs,
            current_ttl: ttl_secs,
        }
    }

    /// Rebuild a record for a payload whose metadata is missing or unreadable.
    /// The access count starts at zero because the prior history is unknown.
    pub fn recovered(model: impl Into<String>, size_mb: f64, ttl_secs: u64) -> Self {
        Self {
            access_count: 0,
            ..Self::new(model, size_mb, ttl_secs)
        }
    }

    pub fn touch(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = timestamp();
    }

    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A metadata record found by scanning the store.
#[derive(Debug, Clone)]
pub(crate) struct ScannedEntry {
    pub key: CacheKey,
    /// `None` when the record could not be decoded.
    pub metadata: Option<CacheMetadata>,
}

impl ScannedEntry {
    /// Unreadable records sort as the oldest.
    pub fn last_accessed(&self) -> f64 {
        self.metadata.as_ref().map(|m| m.last_accessed).unwrap_or(0.0)
    }

    pub fn size_mb(&self) -> f64 {
        self.metadata.as_ref().map(|m| m.size_mb).unwrap_or(0.0)
    }

    pub fn model(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.model.as_str())
    }
}

/// Enumerate every metadata record in the keyspace.
///
/// Keys that vanish between the scan and the read are skipped. Fails with
/// [`crate::Error::Unsupported`] on stores without scan support.
pub(crate) async fn scan(
    store: &dyn KeyValueStore,
    keyspace: &Keyspace,
) -> crate::Result<Vec<ScannedEntry>> {
    let keys = store.keys(&keyspace.metadata_pattern()).await?;
    let mut entries = Vec::with_capacity(keys.len());
    for metadata_key in keys {
        let Some(key) = CacheKey::from_metadata_key(keyspace, &metadata_key) else {
            continue;
        };
        let Some(raw) = store.get(&metadata_key).await? else {
            continue;
        };
        let metadata = match CacheMetadata::from_bytes(&raw) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(key = %metadata_key, error = %e, "unreadable cache metadata");
                None
            }
        };
        entries.push(ScannedEntry { key, metadata });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_starts_at_one_access() {
        let meta = CacheMetadata::new("llama", 0.5, 600);
        assert_eq!(meta.access_count, 1);
        assert_eq!(meta.original_ttl, 600);
        assert_eq!(meta.current_ttl, 600);
        assert_eq!(meta.created, meta.last_accessed);
    }

    #[test]
    fn touch_bumps_count_and_time() {
        let mut meta = CacheMetadata::recovered("llama", 0.5, 600);
        let before = meta.last_accessed;
        meta.touch();
        assert_eq!(meta.access_count, 1);
        assert!(meta.last_accessed >= before);
    }

    #[test]
    fn json_field_names_are_stable() {
        let meta = CacheMetadata::new("llama", 1.5, 300);
        let value: serde_json::Value = serde_json::from_slice(&meta.to_bytes().unwrap()).unwrap();
        for field in [
            "model",
            "created",
            "last_accessed",
            "access_count",
            "size_mb",
            "original_ttl",
            "current_ttl",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert!(CacheMetadata::from_bytes(b"not json").is_err());
    }

    #[tokio::test]
    async fn scan_decodes_and_flags_corrupt_records() {
        use crate::store::MemoryStore;
        let store = MemoryStore::new();
        let ks = Keyspace::new("t:");
        let good = CacheKey::new("t:", "aa");
        let bad = CacheKey::new("t:", "bb");
        store
            .set(&good.metadata_key(), &CacheMetadata::new("llama", 1.0, 60).to_bytes().unwrap(), None)
            .await
            .unwrap();
        store.set(&bad.metadata_key(), b"garbage", None).await.unwrap();
        store.set("other:llm_metadata_cc", b"{}", None).await.unwrap();

        let mut entries = scan(&store, &ks).await.unwrap();
        entries.sort_by(|a, b| a.key.digest().cmp(b.key.digest()));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].model(), Some("llama"));
        assert_eq!(entries[0].size_mb(), 1.0);
        assert!(entries[1].metadata.is_none());
        assert_eq!(entries[1].last_accessed(), 0.0);
    }
}
