//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache and refresh-ahead operations.
///
/// Argument errors (`KeyType`, `KeysArgument`, `TtlType`) and `CacheFull` leave
/// the cache untouched. `Producer` carries a failure shared by every caller
/// that awaited the same coalesced invocation.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Key is neither a string nor a number
    #[error("Key must be a string or a number, got {0}")]
    KeyType(String),

    /// A plural operation was not given a sequence of keys
    #[error("Keys argument must be an array")]
    KeysArgument,

    /// Insertion of a new key at capacity
    #[error("Cache max keys amount exceeded ({0})")]
    CacheFull(usize),

    /// Non-numeric ttl in a batch entry
    #[error("TTL must be a number, got {0}")]
    TtlType(String),

    /// The producer behind a refresh-ahead call failed
    #[error("Producer failed: {0}")]
    Producer(Arc<anyhow::Error>),
}

impl CacheError {
    /// Wraps a producer failure so it can be handed to several waiters.
    pub fn producer(err: anyhow::Error) -> Self {
        CacheError::Producer(Arc::new(err))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::KeyType(_) | CacheError::KeysArgument | CacheError::TtlType(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::CacheFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Producer(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (CacheError::KeyType("true".to_string()), StatusCode::BAD_REQUEST),
            (CacheError::KeysArgument, StatusCode::BAD_REQUEST),
            (CacheError::TtlType("\"ten\"".to_string()), StatusCode::BAD_REQUEST),
            (CacheError::CacheFull(2), StatusCode::SERVICE_UNAVAILABLE),
            (
                CacheError::producer(anyhow::anyhow!("upstream down")),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, expected_status) in test_cases {
            let response = error.into_response();
            assert_eq!(response.status(), expected_status);
        }
    }

    #[test]
    fn test_producer_error_message() {
        let err = CacheError::producer(anyhow::anyhow!("upstream down"));
        assert_eq!(err.to_string(), "Producer failed: upstream down");
    }
}
