//! Mutual exclusion on top of the store's atomic `add`.

use crate::config::LockConfig;
use crate::store::KeyValueStore;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Lock held in the key-value store.
///
/// The lock entry carries a TTL so a holder that dies mid-update only blocks
/// others until the entry expires.
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

/// Proof of ownership returned by [`DistributedLock::acquire`].
#[derive(Debug)]
#[must_use = "a held lock must be released"]
pub struct LockToken {
    token: String,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Backoff before retry `attempt` (0-based): `min * 2^attempt`, capped at `max`.
    fn backoff(cfg: &LockConfig, attempt: u32) -> Duration {
        let base = cfg.retry_min_delay.as_millis() as u64;
        let cap = cfg.retry_max_delay.as_millis() as u64;
        let delay = base.saturating_mul(1u64 << attempt.min(16)).min(cap);
        Duration::from_millis(delay.max(1))
    }

    /// Retry `add` until it succeeds or `acquire_timeout` elapses.
    ///
    /// Store errors are returned immediately; running out of time yields
    /// [`Error::LockTimeout`].
    pub async fn acquire(&self, cfg: &LockConfig) -> Result<LockToken> {
        let token = Uuid::new_v4().to_string();
        let start = Instant::now();
        let deadline = start.checked_add(cfg.acquire_timeout);
        let mut attempt = 0u32;
        loop {
            if self
                .store
                .add(&self.key, token.as_bytes(), cfg.lock_ttl)
                .await?
            {
                return Ok(LockToken { token });
            }
            let now = Instant::now();
            let mut wait = Self::backoff(cfg, attempt);
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(Error::LockTimeout {
                        key: self.key.clone(),
                        waited: now - start,
                    });
                }
                wait = wait.min(deadline - now);
            }
            tokio::time::sleep(wait).await;
            attempt = attempt.saturating_add(1);
        }
    }

    /// Release the lock if the stored token is still ours.
    ///
    /// A lock that expired and was taken over by another holder is left alone.
    pub async fn release(&self, held: LockToken) -> Result<()> {
        match self.store.get(&self.key).await? {
            Some(current) if current == held.token.as_bytes() => {
                self.store.delete(&self.key).await?;
            }
            Some(_) => {
                tracing::warn!(key = %self.key, "lock expired and was re-acquired before release");
            }
            None => {
                tracing::debug!(key = %self.key, "lock already expired at release");
            }
        }
        Ok(())
    }
}
