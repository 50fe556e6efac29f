//! Response DTOs for the demo server API

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;

/// Response body for GET /get/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for PUT /set
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /del/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
    /// Number of entries removed
    pub deleted: usize,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, deleted: usize) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
            deleted,
        }
    }
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    /// Number of stored keys
    pub keys: u64,
    /// Approximate size of all keys
    pub ksize: u64,
    /// Approximate size of all values
    pub vsize: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// Placeholder size of producer calls still running
    pub in_flight_bytes: u64,
}

impl StatsResponse {
    pub fn new(stats: &CacheStats, in_flight_bytes: u64) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            keys: stats.keys,
            ksize: stats.ksize,
            vsize: stats.vsize,
            hit_rate: stats.hit_rate(),
            in_flight_bytes,
        }
    }
}

/// Response body for GET /call/:key
#[derive(Debug, Clone, Serialize)]
pub struct CallResponse {
    pub key: String,
    pub value: Value,
    /// Whether a background refresh is armed for the key
    pub armed: bool,
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for conditions that are not a [`CacheError`](crate::error::CacheError)
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_response_keeps_json_value() {
        let resp = GetResponse::new("k", json!({"a": [1, 2]}));
        let body = serde_json::to_value(&resp).unwrap();
        assert_eq!(body, json!({"key": "k", "value": {"a": [1, 2]}}));
    }

    #[test]
    fn test_delete_response_reports_count() {
        let resp = DeleteResponse::new("gone", 1);
        let body = serde_json::to_value(&resp).unwrap();
        assert_eq!(body["deleted"], 1);
        assert!(body["message"].as_str().unwrap().contains("gone"));
    }

    #[test]
    fn test_stats_response_from_stats() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            keys: 3,
            ksize: 12,
            vsize: 24,
        };
        let resp = StatsResponse::new(&stats, 2);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
        assert_eq!(resp.keys, 3);
        assert_eq!(resp.in_flight_bytes, 2);
    }

    #[test]
    fn test_health_response_serialize() {
        let body = serde_json::to_value(HealthResponse::healthy()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert!(body.get("timestamp").is_some());
    }

    #[test]
    fn test_error_response_serialize() {
        let body = serde_json::to_value(ErrorResponse::new("Key 'x' not found")).unwrap();
        assert_eq!(body, json!({"error": "Key 'x' not found"}));
    }
}
