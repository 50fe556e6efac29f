//! Cache Events Module
//!
//! Notifications emitted by cache mutations and the listener list that
//! delivers them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::SharedValue;

// == Cache Event ==
/// A notification emitted by a cache mutation.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A value was stored under `key`
    Set { key: String, value: SharedValue },
    /// `key` was removed explicitly, carrying the raw stored value
    Del { key: String, value: SharedValue },
    /// `key` was found expired by a lazy check or a sweep
    Expired { key: String, value: SharedValue },
    /// Store and stats were flushed
    Flush,
    /// Access stats were flushed
    FlushStats,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

// == Listeners ==
/// Ordered list of callbacks for one event type.
pub(crate) struct Listeners<E> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(ListenerId, Callback<E>)>>,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn add<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Delivers every event to every callback, in subscription order.
    ///
    /// The callback list is snapshotted first so callbacks may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, events: &[E]) {
        if events.is_empty() {
            return;
        }
        let callbacks: Vec<Callback<E>> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for event in events {
            for callback in &callbacks {
                callback(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_every_listener() {
        let listeners = Listeners::<CacheEvent>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let seen = seen.clone();
            listeners.add(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        listeners.emit(&[CacheEvent::Flush, CacheEvent::FlushStats]);
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_remove_listener() {
        let listeners = Listeners::<CacheEvent>::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let id = {
            let seen = seen.clone();
            listeners.add(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.emit(&[CacheEvent::Flush]);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
