//! Cache Handle Module
//!
//! Thread-safe handle around a [`CacheStore`]: a single-writer/many-reader
//! lock, synchronous notification delivery and the periodic sweeper.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{
    AsKey, AsKeys, CacheEvent, CacheStats, CacheStore, Expiry, Fetch, ListenerId, Listeners,
    MsetEntry, SharedValue,
};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::spawn_sweeper;

// == Shared State ==
pub(crate) struct Shared {
    store: RwLock<CacheStore>,
    listeners: Listeners<CacheEvent>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Runs one full expiration sweep and delivers the resulting events.
    pub(crate) fn sweep(&self) -> usize {
        let (expired, events) = {
            let mut store = self.store.write();
            let expired = store.check_expired();
            (expired, store.drain_events())
        };
        self.listeners.emit(&events);
        expired
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

// == Cache ==
/// A shared, cheaply cloneable TTL cache.
///
/// Notifications are delivered to subscribers after the store lock is
/// released and before the mutating call returns, so a subscriber may call
/// back into the cache.
#[derive(Clone)]
pub struct Cache {
    shared: Arc<Shared>,
}

impl Cache {
    // == Constructor ==
    /// Creates a cache and starts its periodic sweep.
    ///
    /// The sweep needs a tokio runtime; outside of one it is skipped and only
    /// lazy expiry applies.
    pub fn new(config: CacheConfig) -> Self {
        let cache = Self {
            shared: Arc::new(Shared {
                store: RwLock::new(CacheStore::new(config)),
                listeners: Listeners::new(),
                sweeper: Mutex::new(None),
            }),
        };
        cache.start_sweeper();
        cache
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut CacheStore) -> T) -> T {
        let (out, events) = {
            let mut store = self.shared.store.write();
            let out = op(&mut store);
            (out, store.drain_events())
        };
        self.shared.listeners.emit(&events);
        out
    }

    // == Entry Operations ==
    pub fn set(
        &self,
        key: impl AsKey,
        value: impl Into<SharedValue>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.mutate(|store| store.set(key, value, ttl))
    }

    pub fn get(&self, key: impl AsKey) -> Result<Option<SharedValue>> {
        self.mutate(|store| store.get(key))
    }

    pub fn mget(&self, keys: impl AsKeys) -> Result<HashMap<String, SharedValue>> {
        self.mutate(|store| store.mget(keys))
    }

    pub fn mset(&self, batch: &[MsetEntry]) -> Result<()> {
        self.mutate(|store| store.mset(batch))
    }

    pub fn del(&self, keys: impl AsKeys) -> Result<usize> {
        self.mutate(|store| store.del(keys))
    }

    pub fn take(&self, key: impl AsKey) -> Result<Option<SharedValue>> {
        self.mutate(|store| store.take(key))
    }

    pub fn ttl(&self, key: impl AsKey, ttl: Option<f64>) -> Result<bool> {
        self.mutate(|store| store.ttl(key, ttl))
    }

    pub fn get_ttl(&self, key: impl AsKey) -> Result<Option<Expiry>> {
        self.mutate(|store| store.get_ttl(key))
    }

    pub fn has(&self, key: impl AsKey) -> Result<bool> {
        self.mutate(|store| store.has(key))
    }

    pub fn fetch(
        &self,
        key: impl AsKey,
        source: Fetch<'_>,
        ttl: Option<f64>,
    ) -> Result<SharedValue> {
        self.mutate(|store| store.fetch(key, source, ttl))
    }

    pub fn keys(&self) -> Vec<String> {
        self.shared.store.read().keys()
    }

    pub fn len(&self) -> usize {
        self.shared.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.store.read().is_empty()
    }

    pub(crate) fn peek(&self, key: &str) -> Option<SharedValue> {
        self.shared.store.read().peek(key)
    }

    // == Stats ==
    pub fn get_stats(&self) -> CacheStats {
        self.shared.store.read().stats()
    }

    pub fn flush_stats(&self) {
        self.mutate(CacheStore::flush_stats)
    }

    /// Drops every entry and counter, then restarts the periodic sweep.
    pub fn flush_all(&self) {
        self.mutate(CacheStore::flush_all);
        self.close();
        self.start_sweeper();
    }

    // == Expiration ==
    /// Runs a full expiration sweep now, returning how many entries were
    /// found expired.
    pub fn check_expired(&self) -> usize {
        self.shared.sweep()
    }

    /// Stops the periodic sweep. Calling it again is a no-op.
    pub fn close(&self) {
        if let Some(handle) = self.shared.sweeper.lock().take() {
            handle.abort();
            debug!("Expiration sweep stopped");
        }
    }

    /// Whether the periodic sweep is running.
    pub fn is_sweeping(&self) -> bool {
        self.shared
            .sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn start_sweeper(&self) {
        let period = self.shared.store.read().config().check_period;
        if period.is_zero() {
            return;
        }

        let mut slot = self.shared.sweeper.lock();
        if slot.is_some() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime available, periodic expiration sweep disabled");
            return;
        }
        *slot = Some(spawn_sweeper(Arc::downgrade(&self.shared), period));
    }

    // == Notifications ==
    /// Registers a callback for every [`CacheEvent`].
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.add(callback)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }
}
