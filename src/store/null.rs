use super::KeyValueStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Store that keeps nothing. Every lookup misses and scans are unsupported;
/// useful for running the cache stack with caching effectively off.
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for NullStore {
    async fn get(&self, _: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _: &str, _: &[u8], _: Option<Duration>) -> Result<()> {
        Ok(())
    }
    async fn add(&self, _: &str, _: &[u8], _: Duration) -> Result<bool> {
        Ok(true)
    }
    async fn delete(&self, _: &str) -> Result<bool> {
        Ok(false)
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
        "null"
    }
}
