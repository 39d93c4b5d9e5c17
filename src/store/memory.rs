//! In-process store with per-entry expiry.

use super::{glob_to_regex, KeyValueStore};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            data,
            // a TTL past the clock's range never expires
            expires_at: ttl.and_then(|t| Instant::now().checked_add(t)),
        }
    }
    fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Instant::now() >= t).unwrap_or(false)
    }
}

/// Shared in-memory store. Clones share the same map, so one instance can
/// stand in for a store reached by several independent callers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of a live key; `Some(None)` for keys without expiry.
    pub async fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key).filter(|e| !e.is_expired())?;
        Some(
            entry
                .expires_at
                .map(|t| t.saturating_duration_since(Instant::now())),
        )
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        before - entries.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.data.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired: remove lazily
        let mut entries = self.entries.write().await;
        if entries.get(key).map(|e| e.is_expired()).unwrap_or(false) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .map(|e| !e.is_expired())
            .unwrap_or(false))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), StoredValue::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if entries.get(key).map(|e| !e.is_expired()).unwrap_or(false) {
            return Ok(false);
        }
        entries.insert(key.to_string(), StoredValue::new(value.to_vec(), Some(ttl)));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .map(|e| !e.is_expired())
            .unwrap_or(false))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let re = glob_to_regex(pattern)?;
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(k, e)| !e.is_expired() && re.is_match(k))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
