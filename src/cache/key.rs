//! Request Key Derivation
//!
//! Maps a logical request to its cache key: SHA-256 over a canonical JSON
//! form of method, URL, headers and body.

use std::collections::BTreeMap;

use axum::http::HeaderValue;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};
use crate::network::RequestDescriptor;

#[derive(Serialize)]
struct CanonicalRequest<'a> {
    method: String,
    url: &'a str,
    headers: BTreeMap<String, &'a str>,
    body: Option<String>,
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

fn canonicalize(request: &RequestDescriptor) -> Result<CanonicalRequest<'_>> {
    let method = request.method_upper();
    if !is_token(&method) {
        return Err(EngineError::InvalidRequest(format!(
            "invalid method '{}'",
            request.method
        )));
    }

    let url = request.url.trim();
    if url.is_empty() {
        return Err(EngineError::InvalidRequest("URL cannot be empty".to_string()));
    }

    let mut headers = BTreeMap::new();
    for (name, value) in &request.headers {
        if !is_token(name) {
            return Err(EngineError::InvalidRequest(format!(
                "invalid header name '{name}'"
            )));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(EngineError::InvalidRequest(format!(
                "invalid value for header '{name}'"
            )));
        }
        if headers
            .insert(name.to_ascii_lowercase(), value.as_str())
            .is_some()
        {
            return Err(EngineError::InvalidRequest(format!(
                "header '{name}' given more than once"
            )));
        }
    }

    Ok(CanonicalRequest {
        method,
        url,
        headers,
        body: request.body.as_ref().map(hex::encode),
    })
}

/// Derives the cache key of a request.
///
/// Identical method (any case), URL, headers (names compared
/// case-insensitively) and body always yield the same key.
pub fn request_key(request: &RequestDescriptor) -> Result<String> {
    let canonical = canonicalize(request)?;
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| EngineError::InvalidRequest(format!("cannot serialize request: {e}")))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Checks that a request is well-formed without computing its key.
pub fn validate_request(request: &RequestDescriptor) -> Result<()> {
    canonicalize(request).map(|_| ())
}
