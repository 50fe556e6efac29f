//! Cache Module
//!
//! Provides the in-process TTL cache: entry store, stats, notifications and
//! the shared handle with its periodic expiration sweep.

mod entry;
mod events;
mod handle;
mod key;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, expired, CacheEntry, Expiry, SharedValue};
pub use events::{CacheEvent, ListenerId};
pub use handle::Cache;
pub use key::{AsKey, AsKeys};
pub use stats::{CacheStats, ValueSizer, SCALAR_VALUE_SIZE};
pub use store::{CacheStore, Fetch, MsetEntry};

pub(crate) use events::Listeners;
pub(crate) use handle::Shared;
