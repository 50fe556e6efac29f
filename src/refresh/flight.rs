//! In-Flight Registry
//!
//! At most one outstanding producer invocation per key. Every caller that
//! arrives while an invocation runs receives a handle to the same outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cache::SharedValue;
use crate::error::{CacheError, Result};

type Outcome = Result<SharedValue>;

/// Who registered an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// A foreground `call`
    Call,
    /// A background refresh
    Refresh,
}

// == Pending ==
/// Awaitable outcome of one producer invocation.
#[derive(Clone)]
pub(crate) struct Pending {
    rx: watch::Receiver<Option<Outcome>>,
    origin: Origin,
    cancelled: Arc<AtomicBool>,
}

impl Pending {
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Whether the key was deleted or flushed while the invocation ran.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Waits for the invocation to finish.
    ///
    /// An invocation that ends without reporting (its task panicked or was
    /// cancelled) surfaces as a producer error.
    pub async fn wait(mut self) -> Outcome {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(CacheError::producer(anyhow::anyhow!(
                "producer invocation ended without a result"
            )))
        })
    }
}

// == Completion ==
/// Owned by the single task running an invocation.
///
/// The registry entry is cleared exactly once, either by `complete` or on
/// drop, and always before waiters are released.
pub(crate) struct Completion {
    key: String,
    tx: watch::Sender<Option<Outcome>>,
    registry: Arc<InFlight>,
    cancelled: Arc<AtomicBool>,
    cleared: bool,
}

impl Completion {
    /// Whether the key was deleted or flushed while the invocation ran; its
    /// result must not be stored.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn complete(mut self, outcome: Outcome) {
        self.clear();
        self.tx.send_replace(Some(outcome));
    }

    fn clear(&mut self) {
        if !self.cleared {
            self.registry.calls.lock().remove(&self.key);
            self.cleared = true;
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.clear();
    }
}

// == Slot ==
/// What a caller got from the registry.
pub(crate) enum Slot {
    /// A live value appeared while the registry was locked
    Ready(SharedValue),
    /// Another caller's invocation is running
    Joined(Pending),
    /// The caller must run the invocation and report through `Completion`
    Started(Pending, Completion),
}

// == In-Flight Registry ==
#[derive(Default)]
pub(crate) struct InFlight {
    calls: Mutex<HashMap<String, Pending>>,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Joins the running invocation for `key`, or registers a new one.
    ///
    /// `live` is consulted under the registry lock before registering, so a
    /// result stored by an invocation that just finished is never recomputed.
    /// `origin` tags a newly registered invocation.
    pub fn join_or_start(
        self: &Arc<Self>,
        key: &str,
        origin: Origin,
        live: impl FnOnce() -> Option<SharedValue>,
    ) -> Slot {
        let mut calls = self.calls.lock();
        if let Some(pending) = calls.get(key) {
            return Slot::Joined(pending.clone());
        }
        if let Some(value) = live() {
            return Slot::Ready(value);
        }

        let (tx, rx) = watch::channel(None);
        let cancelled = Arc::new(AtomicBool::new(false));
        let pending = Pending {
            rx,
            origin,
            cancelled: cancelled.clone(),
        };
        calls.insert(key.to_string(), pending.clone());
        Slot::Started(
            pending,
            Completion {
                key: key.to_string(),
                tx,
                registry: Arc::clone(self),
                cancelled,
                cleared: false,
            },
        )
    }

    /// Marks the running invocations for `keys` as cancelled.
    pub fn cancel(&self, keys: &[String]) {
        let calls = self.calls.lock();
        for key in keys {
            if let Some(pending) = calls.get(key) {
                pending.cancelled.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Marks every running invocation as cancelled.
    pub fn cancel_all(&self) {
        for pending in self.calls.lock().values() {
            pending.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Number of outstanding invocations.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.calls.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_second_caller_joins() {
        let registry = InFlight::new();

        let Slot::Started(first, completion) =
            registry.join_or_start("k", Origin::Call, || None)
        else {
            panic!("first caller should start the invocation");
        };
        let Slot::Joined(second) = registry.join_or_start("k", Origin::Call, || None) else {
            panic!("second caller should join");
        };
        assert_eq!(registry.len(), 1);

        completion.complete(Ok(Arc::new(json!(7))));
        assert!(!registry.contains("k"));

        let a = first.wait().await.unwrap();
        let b = second.wait().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_live_value_short_circuits() {
        let registry = InFlight::new();
        let slot = registry.join_or_start("k", Origin::Call, || Some(Arc::new(json!("cached"))));

        assert!(matches!(slot, Slot::Ready(_)));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_completion_clears_and_fails_waiters() {
        let registry = InFlight::new();
        let Slot::Started(pending, completion) =
            registry.join_or_start("k", Origin::Call, || None)
        else {
            panic!("first caller should start the invocation");
        };

        drop(completion);
        assert!(!registry.contains("k"));
        assert!(matches!(pending.wait().await, Err(CacheError::Producer(_))));
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let registry = InFlight::new();
        let Slot::Started(first, completion) =
            registry.join_or_start("k", Origin::Call, || None)
        else {
            panic!("first caller should start the invocation");
        };
        let Slot::Joined(second) = registry.join_or_start("k", Origin::Call, || None) else {
            panic!("second caller should join");
        };

        completion.complete(Err(CacheError::producer(anyhow::anyhow!("boom"))));
        for pending in [first, second] {
            let err = pending.wait().await.unwrap_err();
            assert_eq!(err.to_string(), "Producer failed: boom");
        }
    }

    #[tokio::test]
    async fn test_origin_is_kept_for_joiners() {
        let registry = InFlight::new();
        let Slot::Started(_, completion) = registry.join_or_start("k", Origin::Refresh, || None)
        else {
            panic!("first caller should start the invocation");
        };
        let Slot::Joined(joined) = registry.join_or_start("k", Origin::Call, || None) else {
            panic!("second caller should join");
        };

        assert_eq!(joined.origin(), Origin::Refresh);
        completion.complete(Ok(Arc::new(json!(1))));
    }

    #[tokio::test]
    async fn test_cancel_marks_running_invocation() {
        let registry = InFlight::new();
        let Slot::Started(pending, completion) = registry.join_or_start("k", Origin::Call, || None)
        else {
            panic!("first caller should start the invocation");
        };

        registry.cancel(&["other".to_string()]);
        assert!(!completion.is_cancelled());

        registry.cancel(&["k".to_string()]);
        assert!(completion.is_cancelled());
        assert!(pending.is_cancelled());
        completion.complete(Ok(Arc::new(json!(1))));
    }
}
