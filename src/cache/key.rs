//! Cache key generation.

use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Request parameters as received from the caller.
pub type Parameters = serde_json::Map<String, Value>;

/// Parameters that change model output and therefore take part in the key.
pub const KEY_PARAMETERS: &[&str] = &[
    "temperature",
    "top_p",
    "max_tokens",
    "stop",
    "frequency_penalty",
    "presence_penalty",
];

pub const RESPONSE_PREFIX: &str = "llm_response_";
pub const METADATA_PREFIX: &str = "llm_metadata_";
const STATS_KEY: &str = "llm_cache_stats";
const STATS_LOCK_KEY: &str = "llm_cache_stats_lock";
const PERFORMANCE_KEY: &str = "llm_performance_metrics";
const PERFORMANCE_LOCK_KEY: &str = "llm_metrics_lock";

/// Every store key the crate writes, derived from one namespace so several
/// caches can share a store without colliding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyspace {
    namespace: String,
}

impl Keyspace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
    pub fn stats_key(&self) -> String {
        format!("{}{}", self.namespace, STATS_KEY)
    }
    pub fn stats_lock_key(&self) -> String {
        format!("{}{}", self.namespace, STATS_LOCK_KEY)
    }
    pub fn performance_key(&self) -> String {
        format!("{}{}", self.namespace, PERFORMANCE_KEY)
    }
    pub fn performance_lock_key(&self) -> String {
        format!("{}{}", self.namespace, PERFORMANCE_LOCK_KEY)
    }
    /// Glob matching every metadata record in this namespace.
    pub fn metadata_pattern(&self) -> String {
        format!("{}{}*", self.namespace, METADATA_PREFIX)
    }
}

/// Fingerprint of a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    namespace: String,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            namespace: namespace.into(),
        }
    }

    /// Hex digest without any prefix.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Store key of the serialized response.
    pub fn payload_key(&self) -> String {
        format!("{}{}{}", self.namespace, RESPONSE_PREFIX, self.digest)
    }

    /// Store key of the entry's metadata record.
    pub fn metadata_key(&self) -> String {
        format!("{}{}{}", self.namespace, METADATA_PREFIX, self.digest)
    }

    /// Recover a key from a metadata key returned by a scan.
    pub fn from_metadata_key(keyspace: &Keyspace, metadata_key: &str) -> Option<Self> {
        let digest = metadata_key
            .strip_prefix(keyspace.namespace())?
            .strip_prefix(METADATA_PREFIX)?;
        if digest.is_empty() {
            return None;
        }
        Some(Self::new(keyspace.namespace(), digest))
    }

    /// Whether the last hex digit of the digest is even.
    pub fn low_bit_clear(&self) -> bool {
        self.digest
            .chars()
            .last()
            .and_then(|c| c.to_digit(16))
            .map(|d| d % 2 == 0)
            .unwrap_or(false)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.payload_key())
    }
}

#[derive(Serialize)]
struct Canonical<'a> {
    model: &'a str,
    parameters: BTreeMap<&'a str, &'a Value>,
    prompt: &'a str,
}

/// Deterministic (prompt, model, parameters) → [`CacheKey`] encoder.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyCodec {
    keyspace: Keyspace,
}

impl CacheKeyCodec {
    pub fn new(keyspace: Keyspace) -> Self {
        Self { keyspace }
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn encode(&self, prompt: &str, model: &str, parameters: &Parameters) -> Result<CacheKey> {
        let filtered: BTreeMap<&str, &Value> = KEY_PARAMETERS
            .iter()
            .filter_map(|name| parameters.get(*name).map(|v| (*name, v)))
            .collect();
        let canonical = serde_json::to_string(&Canonical {
            model,
            parameters: filtered,
            prompt,
        })
        .map_err(|e| {
            Error::encoding_with_context(
                "failed to serialize cache key input",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("cache_key_codec"),
            )
        })?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Ok(CacheKey::new(self.keyspace.namespace(), digest))
    }

    /// Encode with any serializable parameter object (e.g. a typed request
    /// struct). `null` counts as no parameters; anything else that is not a
    /// JSON object is an encoding error.
    pub fn encode_serializable<P: Serialize + ?Sized>(
        &self,
        prompt: &str,
        model: &str,
        parameters: &P,
    ) -> Result<CacheKey> {
        let value = serde_json::to_value(parameters).map_err(|e| {
            Error::encoding_with_context(
                "parameters are not serializable",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("cache_key_codec"),
            )
        })?;
        match value {
            Value::Object(map) => self.encode(prompt, model, &map),
            Value::Null => self.encode(prompt, model, &Parameters::new()),
            other => Err(Error::encoding_with_context(
                "parameters must serialize to a JSON object",
                ErrorContext::new()
                    .with_field_path("parameters")
                    .with_details(other.to_string())
                    .with_source("cache_key_codec"),
            )),
        }
    }
}
