//! API Routes
//!
//! Configures the Axum router with all control API endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cleanup_handler, clear_handler, connectivity_handler, drain_handler, fetch_handler,
    health_handler, keys_handler, namespace_stats_handler, namespaces_handler,
    set_connectivity_handler, stats_handler, sync_status_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/fetch/:namespace", post(fetch_handler))
        .route("/namespaces", get(namespaces_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/:namespace", get(namespace_stats_handler))
        .route("/cache/:namespace/keys", get(keys_handler))
        .route("/cache/:namespace", delete(clear_handler))
        .route("/cleanup", post(cleanup_handler))
        .route("/sync", get(sync_status_handler))
        .route("/sync/drain", post(drain_handler))
        .route(
            "/connectivity",
            get(connectivity_handler).put(set_connectivity_handler),
        )
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
