//! Engine Response
//!
//! What `execute` hands back, and where it came from.

use serde::Serialize;

use crate::cache::CacheEntry;
use crate::network::NetworkResponse;

/// Origin of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    /// Fresh from the network
    Network,
    /// A valid cached entry
    Cache,
    /// A cached entry served as a degraded fallback
    StaleCache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
    /// Cache key of the request; absent for network-only requests
    pub key: Option<String>,
}

impl EngineResponse {
    pub(crate) fn from_entry(entry: CacheEntry, source: ResponseSource) -> Self {
        Self {
            status: entry.status,
            content_type: entry.payload.content_type,
            body: entry.payload.body,
            source,
            key: Some(entry.key),
        }
    }

    pub(crate) fn from_network(response: NetworkResponse, key: Option<String>) -> Self {
        Self {
            status: response.status,
            content_type: response.content_type().map(str::to_string),
            body: response.body,
            source: ResponseSource::Network,
            key,
        }
    }

    /// True when the caller got a degraded answer.
    pub fn is_stale(&self) -> bool {
        self.source == ResponseSource::StaleCache
    }
}
