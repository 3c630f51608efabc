//! Cache Module
//!
//! Namespaced response cache with max-age validity, max-entries eviction and
//! periodic expiry cleanup.

mod entry;
pub mod eviction;
mod key;
mod namespace;
mod stats;
mod store;


// Re-export public types
pub use entry::{CacheEntry, Payload};
pub use eviction::{CleanupReport, ExpiryManager};
pub use key::{request_key, validate_request};
pub use namespace::{CacheNamespace, NamespaceRegistry, Strategy};
pub use stats::CacheStats;
pub use store::{blob_key, CacheStore, Lookup, CACHE_BLOB_PREFIX};
