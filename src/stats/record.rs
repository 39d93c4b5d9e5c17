//! A single JSON record in the store, updated by locked read-modify-write.

use super::lock::DistributedLock;
use crate::config::LockConfig;
use crate::store::KeyValueStore;
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// Shared record stored without expiry under `key` and guarded by a
/// [`DistributedLock`] on `lock_key`.
///
/// The store has no atomic increment, so every mutation reloads the latest
/// value while holding the lock, applies the change, and writes it back.
pub struct SharedRecord<T> {
    store: Arc<dyn KeyValueStore>,
    key: String,
    lock: DistributedLock,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SharedRecord<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        lock_key: impl Into<String>,
    ) -> Self {
        Self {
            lock: DistributedLock::new(store.clone(), lock_key),
            store,
            key: key.into(),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unlocked read. A missing or unreadable record reads as `T::default()`.
    pub async fn read(&self) -> Result<T> {
        match self.store.get(&self.key).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(value),
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "discarding unreadable record");
                    Ok(T::default())
                }
            },
            None => Ok(T::default()),
        }
    }

    /// Unlocked full overwrite.
    pub async fn overwrite(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(&self.key, &bytes, None).await
    }

    /// Apply `f` under the lock and persist the result.
    pub async fn update<R, F>(&self, cfg: &LockConfig, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R + Send,
        R: Send,
    {
        let held = self.lock.acquire(cfg).await?;
        let outcome = self.modify(f).await;
        if let Err(e) = self.lock.release(held).await {
            tracing::warn!(key = %self.lock.key(), error = %e, "failed to release lock");
        }
        outcome
    }

    async fn modify<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R + Send,
        R: Send,
    {
        let mut value = self.read().await?;
        let out = f(&mut value);
        self.overwrite(&value).await?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Counter {
        n: u64,
    }

    fn record(store: &MemoryStore) -> SharedRecord<Counter> {
        SharedRecord::new(Arc::new(store.clone()), "counter", "counter_lock")
    }

    #[tokio::test]
    async fn missing_record_reads_as_default() {
        let store = MemoryStore::new();
        assert_eq!(record(&store).read().await.unwrap(), Counter::default());
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_default() {
        let store = MemoryStore::new();
        store.set("counter", b"{oops", None).await.unwrap();
        assert_eq!(record(&store).read().await.unwrap(), Counter::default());
    }

    #[tokio::test]
    async fn update_persists_and_releases_lock() {
        let store = MemoryStore::new();
        let rec = record(&store);
        let n = rec
            .update(&LockConfig::default(), |c| {
                c.n += 2;
                c.n
            })
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(rec.read().await.unwrap().n, 2);
        assert_eq!(store.get("counter_lock").await.unwrap(), None);
    }
}
