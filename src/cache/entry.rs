//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with age tracking.

use serde::{Deserialize, Serialize};

use crate::network::NetworkResponse;

// == Payload ==
/// Opaque response bytes plus their content type.
///
/// The body is persisted as a hex string rather than a JSON number array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Payload {
    #[serde(with = "hex")]
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

// == Cache Entry ==
/// Represents a single cached response with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request key, unique within the namespace
    pub key: String,
    /// The stored response
    pub payload: Payload,
    /// Status of the response this entry was built from
    pub status: u16,
    /// Storage timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Number of fresh reads served from this entry
    #[serde(default)]
    pub hit_count: u64,
    /// Insertion order, assigned by the store; breaks `stored_at` ties
    #[serde(default)]
    pub sequence: u64,
}

impl CacheEntry {
    // == Constructor ==
    pub fn new(key: impl Into<String>, payload: Payload, status: u16, stored_at: u64) -> Self {
        Self {
            key: key.into(),
            payload,
            status,
            stored_at,
            hit_count: 0,
            sequence: 0,
        }
    }

    /// Builds an entry from a network response received at `stored_at`.
    pub fn from_response(key: impl Into<String>, response: &NetworkResponse, stored_at: u64) -> Self {
        let payload = Payload {
            body: response.body.clone(),
            content_type: response.content_type().map(str::to_string),
        };
        Self::new(key, payload, response.status, stored_at)
    }

    // == Age ==
    /// Milliseconds since the entry was stored, saturating at zero.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.stored_at)
    }

    // == Is Fresh ==
    /// An entry is valid while its age is strictly below `max_age_ms`.
    pub fn is_fresh(&self, now: u64, max_age_ms: u64) -> bool {
        self.age_ms(now) < max_age_ms
    }

    // == Is Expired ==
    /// Boundary condition: once the age reaches `max_age_ms` the entry is
    /// expired, so cleanup and validity never disagree.
    pub fn is_expired(&self, now: u64, max_age_ms: u64) -> bool {
        !self.is_fresh(now, max_age_ms)
    }

    /// Whether the originating response may be cached at all.
    pub fn is_cacheable(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry_at(stored_at: u64) -> CacheEntry {
        CacheEntry::new("k", Payload::default(), 200, stored_at)
    }

    #[test]
    fn test_from_response_copies_payload() {
        let response = NetworkResponse::ok("hello").with_content_type("text/plain");
        let entry = CacheEntry::from_response("k", &response, 10);

        assert_eq!(entry.payload.body, b"hello");
        assert_eq!(entry.payload.content_type.as_deref(), Some("text/plain"));
        assert_eq!(entry.status, 200);
        assert_eq!(entry.stored_at, 10);
        assert_eq!(entry.hit_count, 0);
    }

    #[test]
    fn test_freshness_window() {
        let entry = entry_at(1_000);
        assert!(entry.is_fresh(1_000, 5_000));
        assert!(entry.is_fresh(5_999, 5_000));
        assert!(entry.is_expired(6_000, 5_000));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = entry_at(1_000);
        // Age equal to max_age is expired
        assert!(entry.is_expired(1_500, 500));
        assert!(!entry.is_fresh(1_500, 500));
    }

    #[test]
    fn test_clock_behind_entry_is_fresh() {
        let entry = entry_at(10_000);
        assert_eq!(entry.age_ms(9_000), 0);
        assert!(entry.is_fresh(9_000, 1));
    }

    #[test]
    fn test_payload_body_is_hex_encoded() {
        let payload = Payload {
            body: vec![0x00, 0x7f, 0xff, b'a'],
            content_type: Some("application/octet-stream".to_string()),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["body"], "007fff61");

        let decoded: Payload = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_cacheable_status() {
        assert!(entry_at(0).is_cacheable());
        let mut failed = entry_at(0);
        failed.status = 503;
        assert!(!failed.is_cacheable());
    }
}
