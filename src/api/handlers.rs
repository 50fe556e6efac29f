//! API Handlers
//!
//! HTTP request handlers for each demo server endpoint.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::cache::AsKey;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::models::{
    CallResponse, DeleteResponse, ErrorResponse, GetResponse, HealthResponse, SetRequest,
    SetResponse, StatsResponse,
};
use crate::refresh::RefreshCache;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Refresh-ahead cache in front of the simulated service
    pub cache: RefreshCache,
}

impl AppState {
    pub fn new(cache: RefreshCache) -> Self {
        Self { cache }
    }

    /// Builds the refresh-ahead cache described by `config` in front of the
    /// simulated downstream service.
    ///
    /// Must be called within a tokio runtime.
    pub fn from_config(config: &ServerConfig) -> Self {
        let delay = Duration::from_millis(config.producer_delay_ms);
        let cache = RefreshCache::new(config.refresh.clone(), move |args| {
            simulated_service(args, delay)
        });
        Self::new(cache)
    }
}

/// Stand-in for a slow downstream service: waits `delay`, then echoes the
/// call arguments with the time the answer was produced.
pub async fn simulated_service(args: Value, delay: Duration) -> anyhow::Result<Value> {
    tokio::time::sleep(delay).await;
    Ok(json!({
        "args": args,
        "produced_at": chrono::Utc::now().to_rfc3339(),
    }))
}

fn not_found(key: &str) -> Response {
    let body = ErrorResponse::new(format!("Key '{}' not found", key));
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    let key = req.key.to_key()?;
    state.cache.set(key.as_str(), req.value, req.ttl)?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    let response = match state.cache.get(key.as_str())? {
        Some(value) => Json(GetResponse::new(key, (*value).clone())).into_response(),
        None => not_found(&key),
    };
    Ok(response)
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    let response = match state.cache.del(key.as_str())? {
        0 => not_found(&key),
        deleted => Json(DeleteResponse::new(key, deleted)).into_response(),
    };
    Ok(response)
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.get_stats();
    Json(StatsResponse::new(&stats, state.cache.in_flight_bytes()))
}

/// Handler for GET /call/:key
///
/// Query parameters become the call arguments handed to the service.
pub async fn call_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<CallResponse>> {
    let args: Map<String, Value> = params
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();
    debug!("Call '{}' with {} argument(s)", key, args.len());

    let value = state.cache.call(key.as_str(), Value::Object(args)).await?;
    let armed = state.cache.is_armed(key.as_str())?;

    Ok(Json(CallResponse {
        key,
        value: (*value).clone(),
        armed,
    }))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
