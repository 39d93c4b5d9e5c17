//! Small shared helpers.

use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Seconds since the Unix epoch, with sub-second precision.
pub fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Size of a serialized payload in megabytes.
pub fn size_mb(len_bytes: usize) -> f64 {
    len_bytes as f64 / BYTES_PER_MB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_mb_uses_binary_megabytes() {
        assert_eq!(size_mb(1024 * 1024), 1.0);
        assert_eq!(size_mb(3 * 1024 * 1024), 3.0);
        assert_eq!(size_mb(0), 0.0);
    }

    #[test]
    fn timestamp_is_after_2020() {
        assert!(timestamp() > 1_577_836_800.0);
    }
}
