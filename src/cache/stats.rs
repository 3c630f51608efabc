//! Cache Statistics Module
//!
//! Tracks per-namespace cache performance metrics.

use serde::Serialize;

// == Cache Stats ==
/// Per-namespace counters. Reset only when the namespace is cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups answered by a fresh entry
    pub hits: u64,
    /// Lookups that found nothing fresh
    pub misses: u64,
    /// Responses served from an expired entry after a failure
    pub stale_served: u64,
    /// Entries removed by the max-entries limit
    pub evictions: u64,
    /// Entries removed by expiry cleanup
    pub expirations: u64,
    /// Current number of entries in the namespace
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_stale_served(&mut self) {
        self.stale_served += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_removal_counters() {
        let mut stats = CacheStats::new();
        stats.record_evictions(2);
        stats.record_expirations(3);
        stats.record_stale_served();
        assert_eq!(stats.evictions, 2);
        assert_eq!(stats.expirations, 3);
        assert_eq!(stats.stale_served, 1);
    }
}
