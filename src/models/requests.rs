//! Request DTOs for the control API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::network::RequestDescriptor;

fn default_method() -> String {
    "GET".to_string()
}

/// Request body for `POST /fetch/:namespace`
///
/// The body, if any, is sent as UTF-8 text.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn into_descriptor(self) -> RequestDescriptor {
        RequestDescriptor {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body.map(String::into_bytes),
        }
    }
}

/// Request body for `PUT /connectivity`
///
/// Omitted fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectivityUpdate {
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub foreground: Option<bool>,
}

impl ConnectivityUpdate {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.online.is_none() && self.foreground.is_none() {
            return Some("At least one of 'online' or 'foreground' is required".to_string());
        }
        None
    }
}
