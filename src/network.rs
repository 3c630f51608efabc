//! Network Capability
//!
//! The engine never talks to a transport directly. It issues
//! [`RequestDescriptor`]s through the [`Network`] trait and only looks at the
//! status, headers and body that come back.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{EngineError, Result};

// == Request Descriptor ==
/// Logical description of one outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// HTTP method, compared case-insensitively
    pub method: String,
    /// Absolute target URL
    pub url: String,
    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Optional request body
    #[serde(default)]
    pub body: Option<Vec<u8>>,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Upper-cased method name.
    pub fn method_upper(&self) -> String {
        self.method.trim().to_ascii_uppercase()
    }

    /// Returns true for non-idempotent, state-changing methods.
    pub fn is_write(&self) -> bool {
        !matches!(self.method_upper().as_str(), "GET" | "HEAD" | "OPTIONS")
    }
}

// == Network Response ==
/// Status, headers and body returned by the network capability.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl NetworkResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.headers
            .insert("content-type".to_string(), content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

// == Network Error ==
/// Failures where no response came back at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),

    /// The request could not be built, so it never left the process.
    #[error("{0}")]
    InvalidRequest(String),
}

// == Network Trait ==
/// Capability to issue a request with a bounded timeout.
#[async_trait]
pub trait Network: Send + Sync {
    async fn send(
        &self,
        request: &RequestDescriptor,
        timeout: Duration,
    ) -> std::result::Result<NetworkResponse, NetworkError>;
}

// == Send With Timeout ==
/// Issues `request` and classifies the outcome for the engine.
///
/// The call is abandoned once `timeout` elapses, whatever the network
/// implementation does with the deadline it is handed. Non-2xx responses
/// become [`EngineError::Upstream`].
pub async fn send_with_timeout(
    network: &dyn Network,
    request: &RequestDescriptor,
    timeout: Duration,
) -> Result<NetworkResponse> {
    match tokio::time::timeout(timeout, network.send(request, timeout)).await {
        Err(_) => Err(EngineError::NetworkTimeout(timeout)),
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(response)) if response.is_success() => Ok(response),
        Ok(Ok(response)) => Err(EngineError::Upstream {
            status: response.status,
        }),
    }
}

// == HTTP Network ==
/// [`Network`] backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EngineError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout(timeout)
    } else if err.is_builder() {
        NetworkError::InvalidRequest(err.to_string())
    } else {
        NetworkError::Transport(err.to_string())
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn send(
        &self,
        request: &RequestDescriptor,
        timeout: Duration,
    ) -> std::result::Result<NetworkResponse, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method_upper().as_bytes())
            .map_err(|e| NetworkError::InvalidRequest(format!("invalid method: {e}")))?;

        let mut builder = self.client.request(method, &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, timeout))?
            .to_vec();

        debug!(url = %request.url, status, bytes = body.len(), "Network response");
        Ok(NetworkResponse {
            status,
            headers,
            body,
        })
    }
}
