//! Eviction & Expiry
//!
//! Two independent removal mechanisms:
//! - max-entries eviction, applied synchronously by every `put`
//! - periodic expiry cleanup, driven by a timer

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::clock::Clock;
use crate::events::{EngineEvent, EventBus};

// == Overflow Victims ==
/// Keys to delete so that at most `max_entries` remain.
///
/// Oldest `stored_at` goes first; equal timestamps fall back to insertion
/// sequence, so the order is deterministic.
pub fn overflow_victims(entries: &HashMap<String, CacheEntry>, max_entries: usize) -> Vec<String> {
    if entries.len() <= max_entries {
        return Vec::new();
    }

    let mut by_age: Vec<&CacheEntry> = entries.values().collect();
    by_age.sort_by_key(|entry| (entry.stored_at, entry.sequence));
    by_age
        .into_iter()
        .take(entries.len() - max_entries)
        .map(|entry| entry.key.clone())
        .collect()
}

// == Expired Keys ==
/// Keys whose age has reached `max_age_ms`.
pub fn expired_keys(entries: &HashMap<String, CacheEntry>, now: u64, max_age_ms: u64) -> Vec<String> {
    entries
        .values()
        .filter(|entry| entry.is_expired(now, max_age_ms))
        .map(|entry| entry.key.clone())
        .collect()
}

// == Cleanup Report ==
/// Outcome of one expiry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Removed entry count per namespace
    pub removed: BTreeMap<String, usize>,
    pub total_removed: usize,
}

// == Expiry Manager ==
/// Runs the expiry pass over every namespace.
pub struct ExpiryManager {
    cache: Arc<CacheStore>,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl ExpiryManager {
    pub fn new(cache: Arc<CacheStore>, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            events,
            clock,
        }
    }

    /// Deletes every entry with `now - stored_at >= max_age`, regardless of
    /// how full its namespace is.
    pub async fn run_cleanup(&self) -> CleanupReport {
        let now = self.clock.now_ms();
        let mut report = CleanupReport::default();

        for name in self.cache.namespace_names() {
            match self.cache.remove_expired(&name, now).await {
                Ok(removed) => {
                    report.total_removed += removed;
                    report.removed.insert(name, removed);
                }
                Err(e) => warn!(namespace = %name, error = %e, "Expiry cleanup failed"),
            }
        }

        if report.total_removed > 0 {
            info!(
                "Expiry cleanup: removed {} expired entries",
                report.total_removed
            );
        } else {
            debug!("Expiry cleanup: no expired entries found");
        }

        self.events.emit(EngineEvent::CleanupCompleted {
            removed: report.removed.clone(),
        });
        report
    }
}
