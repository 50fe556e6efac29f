//! Refresh Cache - An in-process TTL cache with refresh-ahead calls
//!
//! Provides a key-value cache with per-entry TTL, exact usage statistics and
//! change notifications, plus a call-coalescing layer that refreshes results
//! in the background before they expire.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod refresh;
mod tasks;

pub use api::AppState;
pub use cache::{Cache, CacheEvent, CacheStats, Expiry, SharedValue};
pub use config::{CacheConfig, RefreshConfig, ServerConfig};
pub use error::{CacheError, Result};
pub use refresh::{RefreshCache, RefreshError};
