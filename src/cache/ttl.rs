//! TTL selection and adaptive extension.

use super::key::CacheKey;
use std::time::Duration;

/// Upper bound for the extension factor applied to `original_ttl`.
pub const MAX_EXTENSION_FACTOR: f64 = 3.0;

/// TTL for a new entry.
///
/// An explicit TTL is only raised to `min_ttl`. Without one, payloads larger
/// than 1 MB get `default_ttl / size_mb` so big responses expire sooner.
pub fn select_ttl(
    explicit: Option<Duration>,
    size_mb: f64,
    default_ttl: Duration,
    min_ttl: Duration,
) -> Duration {
    let ttl = match explicit {
        Some(ttl) => ttl,
        None if size_mb > 1.0 => {
            let scaled = default_ttl.as_secs_f64() / size_mb;
            Duration::from_secs(scaled as u64).min(default_ttl)
        }
        None => default_ttl,
    };
    ttl.max(min_ttl)
}

/// Whether a hit with the given (already incremented) access count extends the TTL.
///
/// Counts 2..=5 extend for roughly half of all keys, chosen by the parity of
/// the key digest; the decision is stable per key.
pub fn should_extend(key: &CacheKey, access_count: u64) -> bool {
    match access_count {
        0 | 1 => false,
        2..=5 => key.low_bit_clear(),
        _ => true,
    }
}

pub fn extension_factor(access_count: u64) -> f64 {
    (1.0 + access_count as f64 / 10.0).min(MAX_EXTENSION_FACTOR)
}

/// Extended TTL in whole seconds, rounded to the nearest second.
pub fn extended_ttl(original_ttl_secs: u64, access_count: u64) -> u64 {
    (original_ttl_secs as f64 * extension_factor(access_count)).round() as u64
}
