//! Cache Entry Module
//!
//! Defines the wrapped value stored per key together with its absolute expiry,
//! and the single expiry predicate shared by lazy checks and periodic sweeps.

use std::sync::Arc;

use serde_json::Value;

/// Payload handle stored in and returned by the cache.
pub type SharedValue = Arc<Value>;

// == Expiry ==
/// Expiry state of a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The entry never expires
    Never,
    /// The entry expires at this Unix timestamp in milliseconds
    At(i64),
}

// == Cache Entry ==
/// Represents a single cache entry with value and expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: SharedValue,
    /// Expiration timestamp (Unix milliseconds), 0 = never expires
    pub expires_at: i64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl_seconds` after `now`.
    ///
    /// A TTL of zero never expires; a negative TTL yields an entry that is
    /// already expired.
    pub fn new(value: SharedValue, ttl_seconds: f64, now: i64) -> Self {
        Self {
            value,
            expires_at: expires_at(ttl_seconds, now),
        }
    }

    // == Restamp ==
    /// Re-stamps the expiry without touching the value.
    pub fn restamp(&mut self, ttl_seconds: f64, now: i64) {
        self.expires_at = expires_at(ttl_seconds, now);
    }

    /// Returns the expiry state of this entry.
    pub fn expiry(&self) -> Expiry {
        match self.expires_at {
            0 => Expiry::Never,
            at => Expiry::At(at),
        }
    }
}

// == Expired ==
/// Checks whether an entry has expired at `now`.
///
/// An entry with `expires_at == 0` never expires; otherwise it is expired once
/// `now` is strictly past its expiry.
pub fn expired(entry: &CacheEntry, now: i64) -> bool {
    entry.expires_at != 0 && entry.expires_at < now
}

/// Absolute expiry for a TTL in seconds, saturating at the ends of the
/// timestamp range. `0` is reserved for "never", so a finite TTL never maps to
/// it.
fn expires_at(ttl_seconds: f64, now: i64) -> i64 {
    if ttl_seconds == 0.0 {
        return 0;
    }
    // Float to int casts saturate, so huge or infinite TTLs land on i64::MAX
    let offset = (ttl_seconds * 1000.0) as i64;
    match now.saturating_add(offset) {
        0 => -1,
        at => at,
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value() -> SharedValue {
        Arc::new(json!("test_value"))
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new(value(), 0.0, 1_000);

        assert_eq!(*entry.value, json!("test_value"));
        assert_eq!(entry.expires_at, 0);
        assert_eq!(entry.expiry(), Expiry::Never);
        assert!(!expired(&entry, i64::MAX));
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(value(), 60.0, 1_000);

        assert_eq!(entry.expires_at, 61_000);
        assert_eq!(entry.expiry(), Expiry::At(61_000));
        assert!(!expired(&entry, 1_000));
    }

    #[test]
    fn test_fractional_ttl() {
        let entry = CacheEntry::new(value(), 0.25, 1_000);
        assert_eq!(entry.expires_at, 1_250);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new(value(), 1.0, 0);

        // Still live at exactly the expiry instant, expired strictly after
        assert!(!expired(&entry, 1_000));
        assert!(expired(&entry, 1_001));
    }

    #[test]
    fn test_negative_ttl_is_already_expired() {
        let entry = CacheEntry::new(value(), -1.0, 5_000);
        assert!(expired(&entry, 5_000));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::new(value(), 1e300, 1_000);
        assert_eq!(entry.expires_at, i64::MAX);
        assert!(!expired(&entry, i64::MAX - 1));

        let entry = CacheEntry::new(value(), f64::INFINITY, 1_000);
        assert_eq!(entry.expiry(), Expiry::At(i64::MAX));
    }

    #[test]
    fn test_huge_negative_ttl_saturates() {
        let entry = CacheEntry::new(value(), -1e300, 1_000);
        assert!(expired(&entry, 1_000));
        assert_ne!(entry.expiry(), Expiry::Never);
    }

    #[test]
    fn test_restamp_keeps_value() {
        let mut entry = CacheEntry::new(value(), 1.0, 0);
        entry.restamp(0.0, 500);

        assert_eq!(entry.expiry(), Expiry::Never);
        assert_eq!(*entry.value, json!("test_value"));
    }

    #[test]
    fn test_current_timestamp_is_monotonic_enough() {
        let first = current_timestamp_ms();
        let second = current_timestamp_ms();
        assert!(second >= first);
    }
}
