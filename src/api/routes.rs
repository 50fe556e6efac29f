//! API Routes
//!
//! Two groups of endpoints share one refresh-ahead cache: plain key-value
//! access to the results cache, and `/call/:key`, which answers from that
//! cache or asks the simulated service and keeps the answer refreshed.

use axum::{
    routing::{delete, get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    call_handler, delete_handler, get_handler, health_handler, set_handler, stats_handler,
    AppState,
};

/// Creates the demo server router.
///
/// # Endpoints
/// - `PUT /set` - Store a result directly, optional `ttl` in seconds
/// - `GET /get/:key` - Read a result without calling the service
/// - `DELETE /del/:key` - Drop a result and disarm its refresh
/// - `GET /stats` - Hits, misses, sizes and outstanding service calls
/// - `GET /call/:key` - Cached service call; query parameters are the call
///   arguments and are replayed by every background refresh of the key
/// - `GET /health` - Liveness
///
/// Requests pass through a permissive CORS layer and are traced.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let results = Router::new()
        .route("/set", put(set_handler))
        .route("/get/:key", get(get_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/stats", get(stats_handler));

    results
        .route("/call/:key", get(call_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
