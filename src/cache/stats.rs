//! Cache Statistics Module
//!
//! Tracks hits, misses, key count and heuristic key/value sizes. Counters are
//! only moved by the entry store as a side effect of its own mutations.

use serde::Serialize;
use serde_json::Value;

use crate::config::CacheConfig;

/// Size charged for numbers and booleans.
pub const SCALAR_VALUE_SIZE: u64 = 8;

// == Cache Stats ==
/// Snapshot of cache usage counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Current number of entries in the store
    pub keys: u64,
    /// Summed size of all keys
    pub ksize: u64,
    /// Summed estimated size of all values
    pub vsize: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Entry Bookkeeping ==
    /// Accounts for a key entering the store.
    pub(crate) fn add_key(&mut self, key_size: u64) {
        self.keys += 1;
        self.ksize += key_size;
    }

    /// Accounts for a key leaving the store together with its value.
    pub(crate) fn remove_key(&mut self, key_size: u64, value_size: u64) {
        self.keys = self.keys.saturating_sub(1);
        self.ksize = self.ksize.saturating_sub(key_size);
        self.vsize = self.vsize.saturating_sub(value_size);
    }

    pub(crate) fn add_value(&mut self, value_size: u64) {
        self.vsize += value_size;
    }

    pub(crate) fn remove_value(&mut self, value_size: u64) {
        self.vsize = self.vsize.saturating_sub(value_size);
    }

    // == Reset ==
    /// Zeroes the access counters, leaving the content counters alone.
    pub(crate) fn reset_access(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }
}

// == Value Sizer ==
/// Heuristic size estimation for keys and values.
#[derive(Debug, Clone, Copy)]
pub struct ValueSizer {
    object_value_size: u64,
    array_value_size: u64,
    promise_value_size: u64,
}

impl ValueSizer {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            object_value_size: config.object_value_size,
            array_value_size: config.array_value_size,
            promise_value_size: config.promise_value_size,
        }
    }

    /// Size of a key, in characters.
    pub fn key_size(&self, key: &str) -> u64 {
        key.chars().count() as u64
    }

    /// Estimated size of a value.
    ///
    /// Strings count characters, scalars a fixed constant, arrays and objects
    /// a per-element constant times their length. `null` is free.
    pub fn value_size(&self, value: &Value) -> u64 {
        match value {
            Value::Null => 0,
            Value::Bool(_) | Value::Number(_) => SCALAR_VALUE_SIZE,
            Value::String(s) => s.chars().count() as u64,
            Value::Array(items) => self.array_value_size * items.len() as u64,
            Value::Object(fields) => self.object_value_size * fields.len() as u64,
        }
    }

    /// Placeholder size of a payload whose value is still being produced.
    pub fn pending_size(&self) -> u64 {
        self.promise_value_size
    }
}
