//! API Handlers
//!
//! HTTP request handlers for each control API endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::CleanupReport;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::models::{
    AllStatsResponse, ClearResponse, ConnectivityResponse, ConnectivityUpdate, FetchRequest,
    FetchResponse, HealthResponse, KeysResponse, NamespaceInfo, NamespacesResponse, StatsResponse,
};
use crate::sync::{DrainReport, SyncStatus};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Handler for POST /fetch/:namespace
///
/// Runs the request through the namespace's strategy.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Json(req): Json<FetchRequest>,
) -> Result<Json<FetchResponse>> {
    let response = state
        .engine
        .execute(&namespace, req.into_descriptor())
        .await?;
    Ok(Json(response.into()))
}

/// Handler for GET /namespaces
pub async fn namespaces_handler(State(state): State<AppState>) -> Json<NamespacesResponse> {
    let namespaces = state
        .engine
        .registry()
        .iter()
        .map(|ns| NamespaceInfo::from(ns.as_ref()))
        .collect();
    Json(NamespacesResponse { namespaces })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<AllStatsResponse> {
    Json(state.engine.stats().into())
}

/// Handler for GET /stats/:namespace
pub async fn namespace_stats_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<StatsResponse>> {
    let stats = state.engine.cache().stats(&namespace)?;
    Ok(Json(StatsResponse::new(namespace, &stats)))
}

/// Handler for GET /cache/:namespace/keys
pub async fn keys_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<KeysResponse>> {
    let keys = state.engine.cache().keys(&namespace)?.into_iter().collect();
    Ok(Json(KeysResponse { namespace, keys }))
}

/// Handler for DELETE /cache/:namespace
pub async fn clear_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<ClearResponse>> {
    let removed = state.engine.cache().clear(&namespace).await?;
    Ok(Json(ClearResponse::new(namespace, removed)))
}

/// Handler for POST /cleanup
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<CleanupReport> {
    Json(state.engine.run_cleanup().await)
}

/// Handler for GET /sync
pub async fn sync_status_handler(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.engine.sync_status().await)
}

/// Handler for POST /sync/drain
///
/// Drains regardless of the believed connectivity; tasks that still cannot
/// be delivered are retried as usual.
pub async fn drain_handler(State(state): State<AppState>) -> Json<DrainReport> {
    Json(state.engine.drain().await)
}

/// Handler for GET /connectivity
pub async fn connectivity_handler(State(state): State<AppState>) -> Json<ConnectivityResponse> {
    Json(ConnectivityResponse::new(state.engine.connectivity(), None))
}

/// Handler for PUT /connectivity
///
/// Applies `online` first, then `foreground`. Drains triggered by either
/// transition are reported together.
pub async fn set_connectivity_handler(
    State(state): State<AppState>,
    Json(update): Json<ConnectivityUpdate>,
) -> Result<Json<ConnectivityResponse>> {
    if let Some(error_msg) = update.validate() {
        return Err(EngineError::InvalidRequest(error_msg));
    }

    let monitor = state.engine.monitor();
    let mut drained: Option<DrainReport> = None;
    if let Some(online) = update.online {
        drained = monitor.set_online(online).await;
    }
    if let Some(foreground) = update.foreground {
        if let Some(report) = monitor.set_foreground(foreground).await {
            match drained.as_mut() {
                Some(existing) => existing.merge(report),
                None => drained = Some(report),
            }
        }
    }

    Ok(Json(ConnectivityResponse::new(monitor.state(), drained)))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
