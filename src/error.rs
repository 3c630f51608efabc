//! Error types for the offline sync engine
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::network::NetworkError;

// == Engine Error Enum ==
/// Unified error type for the engine and its HTTP surface.
///
/// Permanent sync failures have no variant; they surface only as
/// `sync-permanently-failed` events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Network attempt exceeded the namespace timeout
    #[error("Network timeout after {}ms", .0.as_millis())]
    NetworkTimeout(Duration),

    /// Network unreachable, DNS or connection failure
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Upstream answered with a non-2xx status
    #[error("Upstream returned status {status}")]
    Upstream { status: u16 },

    /// Cache-only lookup found nothing
    #[error("Not found in cache '{namespace}': {key}")]
    NotFoundInCache { namespace: String, key: String },

    /// Namespace is not part of the registry
    #[error("Unknown cache namespace: {0}")]
    UnknownNamespace(String),

    /// Request could not be validated or canonicalized
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Namespace registry or engine settings are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Durable store failed to load or save a blob
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persisted state could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Failures where the request never got an answer from the server.
    ///
    /// Only these are eligible for the sync queue.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::NetworkTimeout(_) | EngineError::TransportFailure(_)
        )
    }

    /// Any failure of the network attempt itself, including upstream errors.
    ///
    /// These may be answered from a cached entry instead.
    pub fn is_network_failure(&self) -> bool {
        self.is_transient() || matches!(self, EngineError::Upstream { .. })
    }
}

impl From<NetworkError> for EngineError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Timeout(after) => EngineError::NetworkTimeout(after),
            NetworkError::Transport(msg) => EngineError::TransportFailure(msg),
            NetworkError::InvalidRequest(msg) => EngineError::InvalidRequest(msg),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::NotFoundInCache { .. } | EngineError::UnknownNamespace(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::NetworkTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::TransportFailure(_) | EngineError::Upstream { .. } => {
                StatusCode::BAD_GATEWAY
            }
            EngineError::InvalidConfig(_)
            | EngineError::Storage(_)
            | EngineError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            EngineError::Upstream { status } => json!({
                "error": self.to_string(),
                "upstream_status": status,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
