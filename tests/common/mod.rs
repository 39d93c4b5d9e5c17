//! Store doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use llm_response_cache::store::{KeyValueStore, MemoryStore};
use llm_response_cache::{Error, ErrorContext, Result};
use std::time::Duration;

fn unavailable(op: &str, key: &str) -> Error {
    Error::store_unavailable(
        format!("{} refused", op),
        ErrorContext::new()
            .with_field_path(key)
            .with_source("failing_store"),
    )
}

/// Every call fails as if the backend were down.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Err(unavailable("get", key))
    }
    async fn set(&self, key: &str, _: &[u8], _: Option<Duration>) -> Result<()> {
        Err(unavailable("set", key))
    }
    async fn add(&self, key: &str, _: &[u8], _: Duration) -> Result<bool> {
        Err(unavailable("add", key))
    }
    async fn delete(&self, key: &str) -> Result<bool> {
        Err(unavailable("delete", key))
    }
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        Err(unavailable("keys", pattern))
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// A working store whose backend cannot enumerate keys.
#[derive(Clone, Default)]
pub struct NoScanStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl KeyValueStore for NoScanStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }
    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.inner.add(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }
    async fn keys(&self, _: &str) -> Result<Vec<String>> {
        Err(Error::Unsupported {
            operation: "keys",
            backend: self.name(),
        })
    }
    fn supports_scan(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str {
        "no-scan"
    }
}

/// Delegates to a [`MemoryStore`] but rejects writes to keys containing `fragment`.
#[derive(Clone)]
pub struct RejectWritesStore {
    pub inner: MemoryStore,
    pub fragment: &'static str,
}

#[async_trait]
impl KeyValueStore for RejectWritesStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        if key.contains(self.fragment) {
            return Err(unavailable("set", key));
        }
        self.inner.set(key, value, ttl).await
    }
    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.inner.add(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys(pattern).await
    }
    fn name(&self) -> &'static str {
        "reject-writes"
    }
}

/// Delegates to a [`MemoryStore`] with added latency on writes, deletes and scans.
#[derive(Clone)]
pub struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
}

impl SlowStore {
    pub fn new(inner: MemoryStore, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value, ttl).await
    }
    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.inner.add(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(key).await
    }
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        tokio::time::sleep(self.delay).await;
        self.inner.keys(pattern).await
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Poll `check` until it holds or a second has passed.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
