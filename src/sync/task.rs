//! Sync Task Module
//!
//! A write that could not reach the server, waiting to be replayed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::network::RequestDescriptor;

/// Number of failed replays after which a task is dropped.
pub const MAX_RETRIES: u32 = 3;

// == Priority ==
/// Replay priority of a method; higher goes first.
pub fn priority_for_method(method: &str) -> u8 {
    match method.trim().to_ascii_uppercase().as_str() {
        "DELETE" => 100,
        "POST" => 80,
        "PUT" => 70,
        "PATCH" => 60,
        _ => 50,
    }
}

// == Sync Task ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: String,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Vec<u8>>,
    /// Enqueue timestamp (Unix milliseconds)
    pub enqueued_at: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub priority: u8,
}

impl SyncTask {
    /// Captures a failed write for later replay.
    pub fn from_request(request: &RequestDescriptor, enqueued_at: u64) -> Self {
        let method = request.method_upper();
        Self {
            id: Uuid::new_v4().to_string(),
            url: request.url.clone(),
            priority: priority_for_method(&method),
            method,
            headers: request.headers.clone(),
            body: request.body.clone(),
            enqueued_at,
            retry_count: 0,
            max_retries: MAX_RETRIES,
        }
    }

    /// Rebuilds the request to replay.
    pub fn to_request(&self) -> RequestDescriptor {
        RequestDescriptor {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Counts one failed replay. Returns true once the task is exhausted.
    pub fn record_failure(&mut self) -> bool {
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}
