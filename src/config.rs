//! Cache configuration.
//!
//! [`CacheConfig`] carries every recognized option. It can be built in code,
//! loaded from `LLM_CACHE_*` environment variables or parsed from YAML.
//! Components hold a [`SharedConfig`] and load the current value on every
//! operation, so a config store may swap in new values at runtime.

use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TTL_SECS: u64 = 60 * 60 * 24;
const MIN_TTL_SECS: u64 = 60 * 5;

/// Options for the distributed lock guarding shared records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Expiry of the lock entry, so a crashed holder cannot deadlock others.
    #[serde(with = "millis")]
    pub lock_ttl: Duration,
    /// Total time spent retrying before the update is dropped.
    #[serde(with = "millis")]
    pub acquire_timeout: Duration,
    #[serde(with = "millis")]
    pub retry_min_delay: Duration,
    #[serde(with = "millis")]
    pub retry_max_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(5),
            retry_min_delay: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(100),
        }
    }
}

impl LockConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
    pub fn with_retry_delays(mut self, min: Duration, max: Duration) -> Self {
        self.retry_min_delay = min;
        self.retry_max_delay = max.max(min);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Size budget for all cached payloads, in megabytes.
    pub max_cache_size_mb: f64,
    /// TTL applied when the caller gives none (before size scaling).
    #[serde(with = "secs")]
    pub default_ttl: Duration,
    /// Floor for every stored TTL.
    #[serde(with = "secs")]
    pub min_ttl: Duration,
    /// Entry-count budget, enforced alongside the size budget.
    pub max_cached_items: u64,
    pub enabled: bool,
    /// Prefix for every key this crate writes into a shared store.
    pub namespace: String,
    /// Reported as the `Environment` dimension of published metrics.
    pub environment: String,
    pub lock: LockConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size_mb: 1024.0,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            min_ttl: Duration::from_secs(MIN_TTL_SECS),
            max_cached_items: 10_000,
            enabled: true,
            namespace: String::new(),
            environment: "development".to_string(),
            lock: LockConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_cache_size_mb(mut self, mb: f64) -> Self {
        self.max_cache_size_mb = mb;
        self
    }
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
    pub fn with_min_ttl(mut self, ttl: Duration) -> Self {
        self.min_ttl = ttl;
        self
    }
    pub fn with_max_cached_items(mut self, items: u64) -> Self {
        self.max_cached_items = items;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }
    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    /// Build a config from defaults overridden by environment variables:
    /// - `LLM_CACHE_MAX_SIZE_MB`
    /// - `LLM_CACHE_DEFAULT_TTL_SECS`
    /// - `LLM_CACHE_MIN_TTL_SECS`
    /// - `LLM_CACHE_MAX_ITEMS`
    /// - `LLM_CACHE_ENABLED` (`true`/`false`/`1`/`0`)
    /// - `LLM_CACHE_NAMESPACE`
    /// - `LLM_CACHE_ENVIRONMENT`
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(mb) = env_parse::<f64>("LLM_CACHE_MAX_SIZE_MB")? {
            cfg.max_cache_size_mb = mb;
        }
        if let Some(secs) = env_parse::<u64>("LLM_CACHE_DEFAULT_TTL_SECS")? {
            cfg.default_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("LLM_CACHE_MIN_TTL_SECS")? {
            cfg.min_ttl = Duration::from_secs(secs);
        }
        if let Some(items) = env_parse::<u64>("LLM_CACHE_MAX_ITEMS")? {
            cfg.max_cached_items = items;
        }
        if let Ok(raw) = std::env::var("LLM_CACHE_ENABLED") {
            cfg.enabled = parse_flag(&raw).ok_or_else(|| {
                Error::configuration_with_context(
                    "expected a boolean flag",
                    ErrorContext::new()
                        .with_field_path("LLM_CACHE_ENABLED")
                        .with_details(raw.clone()),
                )
            })?;
        }
        if let Ok(ns) = std::env::var("LLM_CACHE_NAMESPACE") {
            cfg.namespace = ns;
        }
        if let Ok(env) = std::env::var("LLM_CACHE_ENVIRONMENT") {
            cfg.environment = env;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a YAML document; missing fields keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_cache_size_mb.is_finite() || self.max_cache_size_mb <= 0.0 {
            return Err(invalid(
                "max_cache_size_mb",
                "must be a positive number",
                self.max_cache_size_mb,
            ));
        }
        if self.max_cached_items == 0 {
            return Err(invalid("max_cached_items", "must be at least 1", 0));
        }
        if self.min_ttl > self.default_ttl {
            return Err(invalid(
                "min_ttl",
                "must not exceed default_ttl",
                format!("{:?} > {:?}", self.min_ttl, self.default_ttl),
            ));
        }
        if self.lock.acquire_timeout.is_zero() || self.lock.lock_ttl.is_zero() {
            return Err(invalid(
                "lock",
                "lock_ttl and acquire_timeout must be non-zero",
                format!("{:?}", self.lock),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, msg: &str, value: impl std::fmt::Display) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(format!("config.{}", field))
            .with_details(value.to_string()),
    )
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::configuration_with_context(
                "unparseable value",
                ErrorContext::new().with_field_path(name).with_details(raw),
            )
        }),
        Err(_) => Ok(None),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Hot-swappable configuration handle shared by all cache components.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<ArcSwap<CacheConfig>>,
}

impl SharedConfig {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Current configuration snapshot.
    pub fn load(&self) -> Arc<CacheConfig> {
        self.inner.load_full()
    }

    /// Replace the configuration; takes effect on the next operation.
    pub fn store(&self, config: CacheConfig) -> Result<()> {
        config.validate()?;
        self.inner.store(Arc::new(config));
        Ok(())
    }

    /// Apply an in-place change to a copy of the current configuration.
    pub fn update(&self, f: impl FnOnce(&mut CacheConfig)) -> Result<()> {
        let mut next = (*self.load()).clone();
        f(&mut next);
        self.store(next)
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl From<CacheConfig> for SharedConfig {
    fn from(config: CacheConfig) -> Self {
        Self::new(config)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
