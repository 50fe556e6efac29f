//! Refresh-Ahead Module
//!
//! A call-coalescing cache in front of an asynchronous producer. Results live
//! in one [`Cache`]; the arguments of the last call per key live in a second
//! one whose TTL is the refresh interval. When such an arguments entry
//! expires, the producer is re-invoked in the background with those
//! arguments, so callers keep being served from cache.

mod flight;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{
    current_timestamp_ms, AsKey, AsKeys, Cache, CacheEvent, CacheStats, Expiry, ListenerId,
    Listeners, SharedValue, ValueSizer,
};
use crate::config::{CacheConfig, RefreshConfig};
use crate::error::{CacheError, Result};

use flight::{Completion, InFlight, Origin, Slot};

type ProducerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;
type Producer = Arc<dyn Fn(Value) -> ProducerFuture + Send + Sync>;

// == Refresh Error ==
/// Notification of a failed background refresh.
#[derive(Debug, Clone)]
pub struct RefreshError {
    pub error: CacheError,
    pub key: String,
    pub args: SharedValue,
}

struct Inner {
    results: Cache,
    args: Cache,
    flights: Arc<InFlight>,
    producer: Producer,
    ttr: Duration,
    retry_pause: Duration,
    retry_on_error: bool,
    pending_size: u64,
    error_listeners: Listeners<RefreshError>,
}

// == Refresh Cache ==
/// Refresh-ahead, call-coalescing cache.
///
/// Cheap to clone; clones share caches, registry and producer.
#[derive(Clone)]
pub struct RefreshCache {
    inner: Arc<Inner>,
}

impl RefreshCache {
    // == Constructor ==
    /// Creates a refresh-ahead cache in front of `producer`.
    ///
    /// Must be called within a tokio runtime for background refreshes to run.
    pub fn new<F, Fut>(config: RefreshConfig, producer: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let ttr = config.ttr();
        let retry_pause = config.retry_pause();
        let pending_size = ValueSizer::new(&config.cache).pending_size();

        let args = Cache::new(CacheConfig {
            std_ttl: ttr.as_secs_f64(),
            check_period: config.args_check_period,
            use_clones: config.args_use_clones,
            ..CacheConfig::default()
        });
        let producer: Producer =
            Arc::new(move |args: Value| -> ProducerFuture { Box::pin(producer(args)) });

        let inner = Arc::new(Inner {
            results: Cache::new(config.cache),
            args,
            flights: InFlight::new(),
            producer,
            ttr,
            retry_pause,
            retry_on_error: config.retry_on_error,
            pending_size,
            error_listeners: Listeners::new(),
        });

        let weak = Arc::downgrade(&inner);
        inner.args.subscribe(move |event| {
            if let CacheEvent::Expired { key, value } = event {
                if let Some(inner) = weak.upgrade() {
                    inner.schedule_refresh(key.clone(), value.clone());
                }
            }
        });

        debug!(
            "Refresh-ahead cache ready: ttr={:?}, retry_pause={:?}",
            ttr, retry_pause
        );
        Self { inner }
    }

    // == Call ==
    /// Returns the cached result for `key`, or produces it from `args`.
    ///
    /// Concurrent calls for the same missing key share one producer
    /// invocation and all receive its outcome. Every call also arms a
    /// background refresh for `key` unless one is already armed.
    ///
    /// A call that joined a background refresh which then failed does not see
    /// that error; it runs (or joins) a foreground invocation instead.
    pub async fn call(&self, key: impl AsKey, args: impl Into<SharedValue>) -> Result<SharedValue> {
        let key = key.to_key()?;
        let args = args.into();
        let inner = &self.inner;

        if !inner.args.has(key.as_str())? {
            inner.arm(&key, args.clone(), inner.ttr)?;
        }

        if let Some(value) = inner.results.get(key.as_str())? {
            return Ok(value);
        }

        loop {
            match inner
                .flights
                .join_or_start(&key, Origin::Call, || inner.results.peek(&key))
            {
                Slot::Ready(value) => return Ok(value),
                Slot::Joined(pending) => {
                    let origin = pending.origin();
                    match pending.wait().await {
                        Err(err) if origin == Origin::Refresh => {
                            debug!("Joined refresh of '{}' failed ({}), producing again", key, err);
                        }
                        outcome => return outcome,
                    }
                }
                Slot::Started(pending, completion) => {
                    inner.start(key, args, completion);
                    return pending.wait().await;
                }
            }
        }
    }

    // == Delegated Operations ==
    /// The results cache, for operations not wrapped here.
    pub fn results(&self) -> &Cache {
        &self.inner.results
    }

    pub fn get(&self, key: impl AsKey) -> Result<Option<SharedValue>> {
        self.inner.results.get(key)
    }

    pub fn set(
        &self,
        key: impl AsKey,
        value: impl Into<SharedValue>,
        ttl: Option<f64>,
    ) -> Result<()> {
        self.inner.results.set(key, value, ttl)
    }

    pub fn has(&self, key: impl AsKey) -> Result<bool> {
        self.inner.results.has(key)
    }

    pub fn take(&self, key: impl AsKey) -> Result<Option<SharedValue>> {
        self.inner.results.take(key)
    }

    pub fn ttl(&self, key: impl AsKey, ttl: Option<f64>) -> Result<bool> {
        self.inner.results.ttl(key, ttl)
    }

    pub fn get_ttl(&self, key: impl AsKey) -> Result<Option<Expiry>> {
        self.inner.results.get_ttl(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.results.keys()
    }

    pub fn get_stats(&self) -> CacheStats {
        self.inner.results.get_stats()
    }

    pub fn flush_stats(&self) {
        self.inner.results.flush_stats()
    }

    /// Deletes results and disarms their pending refreshes. Invocations still
    /// running for these keys deliver to their waiters but store nothing.
    pub fn del(&self, keys: impl AsKeys) -> Result<usize> {
        let keys = keys.to_keys()?;
        self.inner.flights.cancel(&keys);
        self.inner.args.del(&keys)?;
        self.inner.results.del(&keys)
    }

    /// Flushes results and every remembered call.
    pub fn flush_all(&self) {
        self.inner.flights.cancel_all();
        self.inner.args.flush_all();
        self.inner.results.flush_all();
    }

    /// Stops the periodic sweeps of both caches. Armed refreshes no longer
    /// fire on their own.
    pub fn close(&self) {
        self.inner.args.close();
        self.inner.results.close();
    }

    // == Introspection ==
    /// Whether a background refresh is armed for `key`.
    pub fn is_armed(&self, key: impl AsKey) -> Result<bool> {
        let key = key.to_key()?;
        Ok(self.inner.args.peek(&key).is_some())
    }

    /// Whether a producer invocation for `key` is running.
    pub fn is_in_flight(&self, key: impl AsKey) -> Result<bool> {
        let key = key.to_key()?;
        Ok(self.inner.flights.contains(&key))
    }

    /// Placeholder size of all outstanding producer invocations.
    pub fn in_flight_bytes(&self) -> u64 {
        self.inner.flights.len() as u64 * self.inner.pending_size
    }

    // == Notifications ==
    /// Registers a callback for events of the results cache.
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.results.subscribe(callback)
    }

    /// Registers a callback for failed background refreshes.
    pub fn on_refresh_error<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&RefreshError) + Send + Sync + 'static,
    {
        self.inner.error_listeners.add(callback)
    }

    pub fn remove_refresh_error_listener(&self, id: ListenerId) -> bool {
        self.inner.error_listeners.remove(id)
    }
}

impl Inner {
    /// Remembers `args` under `key` so a refresh fires after `after`.
    fn arm(&self, key: &str, args: SharedValue, after: Duration) -> Result<()> {
        self.args.set(key, args, Some(after.as_secs_f64()))
    }

    /// Runs the producer in its own task and reports through `completion`.
    ///
    /// A successful value is stored before waiters are released, unless the
    /// key was deleted meanwhile.
    fn start(&self, key: String, args: SharedValue, completion: Completion) {
        let producer = self.producer.clone();
        let results = self.results.clone();

        tokio::spawn(async move {
            let outcome = match producer((*args).clone()).await {
                Ok(value) => {
                    let value: SharedValue = Arc::new(value);
                    if completion.is_cancelled() {
                        debug!("'{}' was deleted while producing, result dropped", key);
                        Ok(value)
                    } else {
                        results.set(key.as_str(), value.clone(), None).map(|()| value)
                    }
                }
                Err(err) => Err(CacheError::producer(err)),
            };
            completion.complete(outcome);
        });
    }

    fn schedule_refresh(self: Arc<Self>, key: String, args: SharedValue) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(self.refresh(key, args));
            }
            Err(_) => warn!("No tokio runtime available, refresh of '{}' skipped", key),
        }
    }

    // == Background Refresh ==
    async fn refresh(self: Arc<Self>, key: String, args: SharedValue) {
        debug!("Refreshing '{}' ahead of expiry", key);

        let pending = match self.flights.join_or_start(&key, Origin::Refresh, || None) {
            Slot::Ready(_) => return,
            Slot::Joined(pending) => pending,
            Slot::Started(pending, completion) => {
                self.start(key.clone(), args.clone(), completion);
                pending
            }
        };
        let watched = pending.clone();
        let outcome = pending.wait().await;

        if watched.is_cancelled() {
            debug!("'{}' was deleted during its refresh, not re-arming", key);
            return;
        }

        match outcome {
            // A result deleted after the refresh stored it stays deleted
            Ok(_) if self.results.peek(&key).is_none() => {
                debug!("'{}' is gone, not re-arming", key);
            }
            Ok(_) => {
                if let Err(err) = self.arm(&key, args, self.ttr) {
                    warn!("Could not re-arm refresh of '{}': {}", key, err);
                }
            }
            Err(error) => {
                warn!("Background refresh of '{}' failed: {}", key, error);
                let retry = self.retry_on_error && self.result_outlives(&key, self.retry_pause);

                self.error_listeners.emit(&[RefreshError {
                    error,
                    key: key.clone(),
                    args: args.clone(),
                }]);

                if retry {
                    debug!("Retrying refresh of '{}' in {:?}", key, self.retry_pause);
                    if let Err(err) = self.arm(&key, args, self.retry_pause) {
                        warn!("Could not re-arm refresh of '{}': {}", key, err);
                    }
                }
            }
        }
    }

    /// Whether the stored result for `key` lives longer than `span`.
    fn result_outlives(&self, key: &str, span: Duration) -> bool {
        match self.results.get_ttl(key) {
            Ok(Some(Expiry::Never)) => true,
            Ok(Some(Expiry::At(at))) => at - current_timestamp_ms() > span.as_millis() as i64,
            Ok(None) | Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_producer(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(Value) -> std::future::Ready<anyhow::Result<Value>> + Send + Sync + 'static {
        move |args: Value| -> std::future::Ready<anyhow::Result<Value>> {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok(json!({ "args": args, "n": n })))
        }
    }

    #[tokio::test]
    async fn test_call_caches_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = RefreshCache::new(RefreshConfig::default(), counting_producer(calls.clone()));

        let first = cache.call("k", json!(1)).await.unwrap();
        let second = cache.call("k", json!(1)).await.unwrap();

        assert_eq!(*first, json!({"args": 1, "n": 1}));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_armed("k").unwrap());
        assert!(!cache.is_in_flight("k").unwrap());
        cache.close();
    }

    #[tokio::test]
    async fn test_del_disarms_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = RefreshCache::new(RefreshConfig::default(), counting_producer(calls));

        cache.call("k", json!(1)).await.unwrap();
        assert_eq!(cache.del("k").unwrap(), 1);

        assert!(!cache.has("k").unwrap());
        assert!(!cache.is_armed("k").unwrap());
        cache.close();
    }

    #[tokio::test]
    async fn test_flush_all_disarms_everything() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = RefreshCache::new(RefreshConfig::default(), counting_producer(calls));

        cache.call("a", json!(1)).await.unwrap();
        cache.call("b", json!(2)).await.unwrap();
        cache.flush_all();

        assert!(cache.keys().is_empty());
        assert!(!cache.is_armed("a").unwrap());
        assert!(!cache.is_armed("b").unwrap());
        cache.close();
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected_before_producing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = RefreshCache::new(RefreshConfig::default(), counting_producer(calls.clone()));

        let result = cache.call(&json!(false), json!(1)).await;
        assert!(matches!(result, Err(CacheError::KeyType(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        cache.close();
    }

    #[tokio::test]
    async fn test_foreground_failure_propagates() {
        let cache = RefreshCache::new(RefreshConfig::default(), |_args| async {
            Err::<Value, _>(anyhow::anyhow!("service unavailable"))
        });

        let err = cache.call("k", json!(null)).await.unwrap_err();
        assert!(matches!(err, CacheError::Producer(_)));
        assert!(!cache.has("k").unwrap());
        assert!(!cache.is_in_flight("k").unwrap());
        assert_eq!(cache.in_flight_bytes(), 0);
        cache.close();
    }
}
