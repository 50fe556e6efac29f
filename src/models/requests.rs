//! Request DTOs for the demo server API

use serde::Deserialize;
use serde_json::Value;

/// Request body for the SET operation (PUT /set)
///
/// `key` is kept dynamically typed so that a non-string, non-numeric key
/// reaches the cache and is rejected there with a `KeyType` error.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: Value,
    pub value: Value,
    /// TTL in seconds; absent applies the default, 0 never expires
    #[serde(default)]
    pub ttl: Option<f64>,
}
