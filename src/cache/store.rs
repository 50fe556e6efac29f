//! Cache Store Module
//!
//! Single-owner entry store: HashMap storage, TTL expiry, exact stats
//! bookkeeping and a buffer of pending notifications. Every operation runs to
//! completion under `&mut self`; sharing is layered on top by
//! [`Cache`](crate::cache::Cache).

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{
    current_timestamp_ms, expired, AsKey, AsKeys, CacheEntry, CacheEvent, CacheStats, Expiry,
    SharedValue, ValueSizer,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Fetch Source ==
/// Where `fetch` takes its value from on a miss.
pub enum Fetch<'a> {
    /// A literal value
    Value(SharedValue),
    /// A producer invoked only on a miss
    Producer(Box<dyn FnOnce() -> Value + 'a>),
}

impl<'a> Fetch<'a> {
    pub fn value(value: impl Into<SharedValue>) -> Self {
        Fetch::Value(value.into())
    }

    pub fn producer(produce: impl FnOnce() -> Value + 'a) -> Self {
        Fetch::Producer(Box::new(produce))
    }
}

// == Mset Entry ==
/// One entry of a batch write. Key and ttl are dynamically typed and
/// validated before anything in the batch is written.
#[derive(Debug, Clone, Deserialize)]
pub struct MsetEntry {
    pub key: Value,
    pub val: Value,
    #[serde(default)]
    pub ttl: Option<Value>,
}

impl MsetEntry {
    pub fn new(key: impl Into<Value>, val: impl Into<Value>, ttl: Option<f64>) -> Self {
        Self {
            key: key.into(),
            val: val.into(),
            ttl: ttl.map(Value::from),
        }
    }
}

// == Cache Store ==
/// Main cache storage with TTL support and usage statistics.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Usage statistics, always in step with `entries`
    stats: CacheStats,
    /// Size heuristics for stats
    sizer: ValueSizer,
    /// Immutable options
    config: CacheConfig,
    /// Notifications not yet delivered
    events: Vec<CacheEvent>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store with the given options.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            sizer: ValueSizer::new(&config),
            config,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Set ==
    /// Stores a value under `key`.
    ///
    /// A `ttl` of `None` applies the default TTL, `Some(0.0)` never expires.
    /// Fails with `CacheFull` when `key` is new and the store is at
    /// `max_keys`; overwrites are always allowed.
    pub fn set(
        &mut self,
        key: impl AsKey,
        value: impl Into<SharedValue>,
        ttl: Option<f64>,
    ) -> Result<()> {
        let key = key.to_key()?;
        self.insert(key, value.into(), ttl)
    }

    fn insert(&mut self, key: String, value: SharedValue, ttl: Option<f64>) -> Result<()> {
        let ttl = self.resolve_ttl(ttl)?;
        let previous_size = self
            .entries
            .get(&key)
            .map(|entry| self.sizer.value_size(&entry.value));

        if previous_size.is_none() {
            if let Some(max) = self.config.max_keys {
                if self.entries.len() >= max {
                    return Err(CacheError::CacheFull(max));
                }
            }
        }

        let value = self.wrap_value(value);
        let entry = CacheEntry::new(value.clone(), ttl, current_timestamp_ms());

        match previous_size {
            Some(size) => self.stats.remove_value(size),
            None => self.stats.add_key(self.sizer.key_size(&key)),
        }
        self.stats.add_value(self.sizer.value_size(&value));
        self.entries.insert(key.clone(), entry);
        self.events.push(CacheEvent::Set { key, value });
        Ok(())
    }

    // == Get ==
    /// Retrieves a live value, counting a hit, or `None` counting a miss.
    pub fn get(&mut self, key: impl AsKey) -> Result<Option<SharedValue>> {
        let key = key.to_key()?;
        Ok(self.lookup(&key, current_timestamp_ms()))
    }

    // == Multi Get ==
    /// Retrieves several keys, returning only those that were live.
    pub fn mget(&mut self, keys: impl AsKeys) -> Result<HashMap<String, SharedValue>> {
        if !keys.is_sequence() {
            return Err(CacheError::KeysArgument);
        }
        let keys = keys.to_keys()?;
        let now = current_timestamp_ms();

        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.lookup(&key, now) {
                found.insert(key, value);
            }
        }
        Ok(found)
    }

    // == Multi Set ==
    /// Stores a batch of entries.
    ///
    /// The capacity test counts every entry as new and rejects the whole batch
    /// up front. Keys and ttls are then validated for the entire batch before
    /// any write. A failure while writing is returned as is; entries written
    /// earlier in the batch are kept.
    pub fn mset(&mut self, batch: &[MsetEntry]) -> Result<()> {
        if let Some(max) = self.config.max_keys {
            if self.entries.len() + batch.len() > max {
                return Err(CacheError::CacheFull(max));
            }
        }

        let mut validated = Vec::with_capacity(batch.len());
        for item in batch {
            let key = item.key.to_key()?;
            let ttl = match &item.ttl {
                None | Some(Value::Null) => None,
                Some(Value::Number(n)) => n.as_f64(),
                Some(other) => return Err(CacheError::TtlType(other.to_string())),
            };
            self.resolve_ttl(ttl)?;
            validated.push((key, Arc::new(item.val.clone()), ttl));
        }

        for (key, value, ttl) in validated {
            self.insert(key, value, ttl)?;
        }
        Ok(())
    }

    // == Delete ==
    /// Removes one key or a sequence of keys, returning how many existed.
    pub fn del(&mut self, keys: impl AsKeys) -> Result<usize> {
        let keys = keys.to_keys()?;

        let mut removed = 0;
        for key in keys {
            if let Some(entry) = self.remove(&key) {
                removed += 1;
                self.events.push(CacheEvent::Del {
                    key,
                    value: entry.value,
                });
            }
        }
        Ok(removed)
    }

    // == Take ==
    /// Reads a live value and deletes it in the same step.
    pub fn take(&mut self, key: impl AsKey) -> Result<Option<SharedValue>> {
        let key = key.to_key()?;
        let value = self.lookup(&key, current_timestamp_ms());
        if value.is_some() {
            if let Some(entry) = self.remove(&key) {
                self.events.push(CacheEvent::Del {
                    key,
                    value: entry.value,
                });
            }
        }
        Ok(value)
    }

    // == Restamp TTL ==
    /// Re-stamps the expiry of a live key.
    ///
    /// `None` applies the default TTL; a negative TTL deletes the key.
    /// Returns whether a live key was found.
    pub fn ttl(&mut self, key: impl AsKey, ttl: Option<f64>) -> Result<bool> {
        let key = key.to_key()?;
        let ttl = self.resolve_ttl(ttl)?;
        let now = current_timestamp_ms();
        if !self.check(&key, now) {
            return Ok(false);
        }

        if ttl < 0.0 {
            if let Some(entry) = self.remove(&key) {
                self.events.push(CacheEvent::Del {
                    key,
                    value: entry.value,
                });
            }
        } else if let Some(entry) = self.entries.get_mut(&key) {
            entry.restamp(ttl, now);
        }
        Ok(true)
    }

    // == Get TTL ==
    /// Returns the expiry of a live key, or `None` if missing or expired.
    pub fn get_ttl(&mut self, key: impl AsKey) -> Result<Option<Expiry>> {
        let key = key.to_key()?;
        if !self.check(&key, current_timestamp_ms()) {
            return Ok(None);
        }
        Ok(self.entries.get(&key).map(CacheEntry::expiry))
    }

    // == Has ==
    /// Whether `key` holds a live value. Does not touch hit/miss counters.
    pub fn has(&mut self, key: impl AsKey) -> Result<bool> {
        let key = key.to_key()?;
        Ok(self.check(&key, current_timestamp_ms()))
    }

    // == Fetch ==
    /// Returns the live value for `key`, or stores and returns one from `source`.
    pub fn fetch(
        &mut self,
        key: impl AsKey,
        source: Fetch<'_>,
        ttl: Option<f64>,
    ) -> Result<SharedValue> {
        let key = key.to_key()?;
        if let Some(value) = self.lookup(&key, current_timestamp_ms()) {
            return Ok(value);
        }

        let value = match source {
            Fetch::Value(value) => value,
            Fetch::Producer(produce) => Arc::new(produce()),
        };
        self.insert(key.clone(), value.clone(), ttl)?;
        Ok(self
            .entries
            .get(&key)
            .map(|entry| self.unwrap_value(entry))
            .unwrap_or(value))
    }

    // == Keys ==
    /// Returns all live keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let now = current_timestamp_ms();
        self.entries
            .iter()
            .filter(|(_, entry)| !expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    // == Flush ==
    /// Drops every entry and zeroes every counter.
    pub fn flush_all(&mut self) {
        self.entries.clear();
        self.stats = CacheStats::new();
        self.events.push(CacheEvent::Flush);
    }

    /// Zeroes hit and miss counters.
    pub fn flush_stats(&mut self) {
        self.stats.reset_access();
        self.events.push(CacheEvent::FlushStats);
    }

    // == Check Expired ==
    /// Applies the expiry check to every entry.
    ///
    /// Returns the number of entries found expired.
    pub fn check_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.check(key, now);
        }
        expired_keys.len()
    }

    // == Length ==
    /// Number of entries physically held, including expired ones kept by
    /// `delete_on_expire = false`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hands out and clears the pending notifications.
    pub fn drain_events(&mut self) -> Vec<CacheEvent> {
        std::mem::take(&mut self.events)
    }

    /// Live value without touching counters, expiring anything or emitting
    /// notifications.
    pub(crate) fn peek(&self, key: &str) -> Option<SharedValue> {
        let now = current_timestamp_ms();
        self.entries
            .get(key)
            .filter(|entry| !expired(entry, now))
            .map(|entry| self.unwrap_value(entry))
    }

    /// Applies the default TTL and rejects NaN, which has no expiry.
    fn resolve_ttl(&self, ttl: Option<f64>) -> Result<f64> {
        let ttl = ttl.unwrap_or(self.config.std_ttl);
        if ttl.is_nan() {
            return Err(CacheError::TtlType("NaN".to_string()));
        }
        Ok(ttl)
    }

    fn lookup(&mut self, key: &str, now: i64) -> Option<SharedValue> {
        if !self.check(key, now) {
            self.stats.record_miss();
            return None;
        }
        self.stats.record_hit();
        self.entries.get(key).map(|entry| self.unwrap_value(entry))
    }

    // == Lazy Expiry Check ==
    /// Whether `key` is present and live at `now`.
    ///
    /// An expired entry emits `Expired` and is removed when
    /// `delete_on_expire` is set; otherwise it stays in place but still reads
    /// as absent.
    fn check(&mut self, key: &str, now: i64) -> bool {
        let Some(entry) = self.entries.get(key) else {
            return false;
        };
        if !expired(entry, now) {
            return true;
        }

        let value = self.unwrap_value(entry);
        if self.config.delete_on_expire {
            self.remove(key);
        }
        self.events.push(CacheEvent::Expired {
            key: key.to_string(),
            value,
        });
        false
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.stats.remove_key(
            self.sizer.key_size(key),
            self.sizer.value_size(&entry.value),
        );
        Some(entry)
    }

    fn wrap_value(&self, value: SharedValue) -> SharedValue {
        if self.config.force_string && !value.is_string() {
            return Arc::new(Value::String(value.to_string()));
        }
        if self.config.use_clones {
            Arc::new((*value).clone())
        } else {
            value
        }
    }

    fn unwrap_value(&self, entry: &CacheEntry) -> SharedValue {
        if self.config.use_clones {
            Arc::new((*entry.value).clone())
        } else {
            entry.value.clone()
        }
    }
}
