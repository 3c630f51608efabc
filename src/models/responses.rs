//! Response DTOs for the control API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::{CacheNamespace, CacheStats, Strategy};
use crate::connectivity::ConnectivitySnapshot;
use crate::policy::{EngineResponse, ResponseSource};
use crate::sync::DrainReport;

/// Response body for `POST /fetch/:namespace`
#[derive(Debug, Clone, Serialize)]
pub struct FetchResponse {
    pub status: u16,
    pub source: ResponseSource,
    pub stale: bool,
    pub content_type: Option<String>,
    pub key: Option<String>,
    /// Payload decoded as UTF-8, lossily
    pub body: String,
}

impl From<EngineResponse> for FetchResponse {
    fn from(response: EngineResponse) -> Self {
        Self {
            status: response.status,
            source: response.source,
            stale: response.is_stale(),
            content_type: response.content_type,
            key: response.key,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }
    }
}

/// One entry of `GET /namespaces`
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub strategy: Strategy,
    pub max_age_ms: u64,
    pub max_entries: usize,
    pub network_timeout_ms: u64,
}

impl From<&CacheNamespace> for NamespaceInfo {
    fn from(ns: &CacheNamespace) -> Self {
        Self {
            name: ns.name.clone(),
            strategy: ns.strategy,
            max_age_ms: ns.max_age_ms(),
            max_entries: ns.max_entries,
            network_timeout_ms: ns.network_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespacesResponse {
    pub namespaces: Vec<NamespaceInfo>,
}

/// Response body for `GET /stats/:namespace`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub namespace: String,
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(namespace: impl Into<String>, stats: &CacheStats) -> Self {
        Self {
            namespace: namespace.into(),
            hits: stats.hits,
            misses: stats.misses,
            stale_served: stats.stale_served,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct AllStatsResponse {
    pub namespaces: Vec<StatsResponse>,
}

impl From<BTreeMap<String, CacheStats>> for AllStatsResponse {
    fn from(all: BTreeMap<String, CacheStats>) -> Self {
        Self {
            namespaces: all
                .iter()
                .map(|(name, stats)| StatsResponse::new(name.as_str(), stats))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeysResponse {
    pub namespace: String,
    pub keys: Vec<String>,
}

/// Response body for `DELETE /cache/:namespace`
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub namespace: String,
    pub removed: usize,
}

impl ClearResponse {
    pub fn new(namespace: impl Into<String>, removed: usize) -> Self {
        let namespace = namespace.into();
        Self {
            message: format!("Namespace '{}' cleared", namespace),
            namespace,
            removed,
        }
    }
}

/// Response body for `GET /connectivity` and `PUT /connectivity`
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityResponse {
    pub online: bool,
    pub foreground: bool,
    /// Outcome of the drain a transition triggered, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drained: Option<DrainReport>,
}

impl ConnectivityResponse {
    pub fn new(snapshot: ConnectivitySnapshot, drained: Option<DrainReport>) -> Self {
        Self {
            online: snapshot.online,
            foreground: snapshot.foreground,
            drained,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
