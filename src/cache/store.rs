//! Cache Store Module
//!
//! Named, independently locked namespaces of cached responses, with
//! max-entries eviction on every `put` and optional durable snapshots.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::eviction::{expired_keys, overflow_victims};
use crate::cache::{CacheEntry, CacheNamespace, CacheStats, NamespaceRegistry};
use crate::error::{EngineError, Result};
use crate::storage::DurableStore;

/// Blob key prefix for persisted namespaces.
pub const CACHE_BLOB_PREFIX: &str = "cache/";

/// Blob key holding the snapshot of one namespace.
pub fn blob_key(namespace: &str) -> String {
    format!("{CACHE_BLOB_PREFIX}{namespace}")
}

// == Lookup ==
/// Result of consulting the cache for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Entry younger than the namespace `max_age`
    Fresh(CacheEntry),
    /// Entry present but expired
    Stale(CacheEntry),
    Missing,
}

impl Lookup {
    pub fn into_entry(self) -> Option<CacheEntry> {
        match self {
            Lookup::Fresh(entry) | Lookup::Stale(entry) => Some(entry),
            Lookup::Missing => None,
        }
    }
}

#[derive(Default)]
struct NamespaceState {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

struct NamespaceSlot {
    config: Arc<CacheNamespace>,
    state: Mutex<NamespaceState>,
    /// Serializes snapshot writes so the last save carries the newest state
    persist_lock: tokio::sync::Mutex<()>,
}

// == Cache Store ==
/// All namespaces of the engine.
///
/// Each namespace has its own lock, so every operation is atomic with respect
/// to a single key and operations on different namespaces never contend.
pub struct CacheStore {
    slots: BTreeMap<String, NamespaceSlot>,
    durable: Option<Arc<dyn DurableStore>>,
    next_sequence: AtomicU64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an in-memory store with one empty slot per namespace.
    pub fn new(registry: &NamespaceRegistry) -> Self {
        let slots = registry
            .iter()
            .map(|config| {
                (
                    config.name.clone(),
                    NamespaceSlot {
                        config: config.clone(),
                        state: Mutex::new(NamespaceState::default()),
                        persist_lock: tokio::sync::Mutex::new(()),
                    },
                )
            })
            .collect();

        Self {
            slots,
            durable: None,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Creates a store that snapshots every mutation into `durable`.
    pub fn with_durable(registry: &NamespaceRegistry, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            durable: Some(durable),
            ..Self::new(registry)
        }
    }

    // == Restore ==
    /// Creates a persistent store and loads every namespace snapshot.
    ///
    /// Unreadable snapshots are skipped; the namespace starts empty.
    pub async fn restore(registry: &NamespaceRegistry, durable: Arc<dyn DurableStore>) -> Self {
        let store = Self::with_durable(registry, durable.clone());
        let mut next_sequence = 0;
        let mut restored = 0;

        for (name, slot) in &store.slots {
            let entries: Vec<CacheEntry> = match durable.load_blob(&blob_key(name)).await {
                Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(namespace = %name, error = %e, "Discarding unreadable cache snapshot");
                        continue;
                    }
                },
                Ok(None) => continue,
                Err(e) => {
                    warn!(namespace = %name, error = %e, "Failed to load cache snapshot");
                    continue;
                }
            };

            {
                let mut state = slot.state.lock();
                for entry in entries.into_iter().filter(CacheEntry::is_cacheable) {
                    next_sequence = next_sequence.max(entry.sequence + 1);
                    state.entries.insert(entry.key.clone(), entry);
                }
                // The limit may have shrunk since the snapshot was taken
                for key in overflow_victims(&state.entries, slot.config.max_entries) {
                    state.entries.remove(&key);
                }
                let total = state.entries.len();
                state.stats.set_total_entries(total);
                restored += total;
            }
        }

        store.next_sequence.store(next_sequence, Ordering::SeqCst);
        info!("Cache restored: {} entries across {} namespaces", restored, store.slots.len());
        store
    }

    fn slot(&self, namespace: &str) -> Result<&NamespaceSlot> {
        self.slots
            .get(namespace)
            .ok_or_else(|| EngineError::UnknownNamespace(namespace.to_string()))
    }

    async fn persist(&self, slot: &NamespaceSlot) -> Result<()> {
        let Some(durable) = &self.durable else {
            return Ok(());
        };

        let _guard = slot.persist_lock.lock().await;
        let bytes = {
            let state = slot.state.lock();
            let mut entries: Vec<&CacheEntry> = state.entries.values().collect();
            entries.sort_by_key(|entry| entry.sequence);
            serde_json::to_vec(&entries)?
        };
        durable.save_blob(&blob_key(&slot.config.name), bytes).await
    }

    /// Configuration of a namespace.
    pub fn namespace(&self, namespace: &str) -> Result<Arc<CacheNamespace>> {
        Ok(self.slot(namespace)?.config.clone())
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    // == Get ==
    /// Returns the entry for `key`, fresh or not, without touching statistics.
    pub fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let slot = self.slot(namespace)?;
        let state = slot.state.lock();
        Ok(state.entries.get(key).cloned())
    }

    // == Lookup ==
    /// Consults the cache on behalf of a request.
    ///
    /// A fresh entry counts as a hit and bumps its `hit_count`; an expired or
    /// absent entry counts as a miss. Expired entries are left in place so they
    /// can still be served as a fallback.
    pub fn lookup(&self, namespace: &str, key: &str, now: u64) -> Result<Lookup> {
        let slot = self.slot(namespace)?;
        let max_age_ms = slot.config.max_age_ms();
        let mut guard = slot.state.lock();
        let state = &mut *guard;

        let lookup = match state.entries.get_mut(key) {
            Some(entry) if entry.is_fresh(now, max_age_ms) => {
                entry.hit_count += 1;
                state.stats.record_hit();
                Lookup::Fresh(entry.clone())
            }
            Some(entry) => {
                state.stats.record_miss();
                Lookup::Stale(entry.clone())
            }
            None => {
                state.stats.record_miss();
                Lookup::Missing
            }
        };
        Ok(lookup)
    }

    // == Put ==
    /// Stores (or replaces) an entry, then evicts the oldest entries while the
    /// namespace is over its limit.
    ///
    /// Entries built from a non-2xx response are refused. Returns the evicted
    /// keys. A persistence failure is reported after the in-memory state has
    /// already been updated.
    pub async fn put(&self, namespace: &str, mut entry: CacheEntry) -> Result<Vec<String>> {
        if !entry.is_cacheable() {
            return Err(EngineError::Upstream {
                status: entry.status,
            });
        }

        let slot = self.slot(namespace)?;
        let evicted = {
            let mut state = slot.state.lock();
            entry.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            state.entries.insert(entry.key.clone(), entry);

            let victims = overflow_victims(&state.entries, slot.config.max_entries);
            for key in &victims {
                state.entries.remove(key);
            }
            state.stats.record_evictions(victims.len());
            let total = state.entries.len();
            state.stats.set_total_entries(total);
            victims
        };

        if !evicted.is_empty() {
            debug!(namespace, evicted = evicted.len(), "Max-entries eviction");
        }

        self.persist(slot).await?;
        Ok(evicted)
    }

    // == Delete ==
    /// Removes an entry. Returns whether it existed.
    pub async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let slot = self.slot(namespace)?;
        let removed = {
            let mut state = slot.state.lock();
            let removed = state.entries.remove(key).is_some();
            let total = state.entries.len();
            state.stats.set_total_entries(total);
            removed
        };

        if removed {
            self.persist(slot).await?;
        }
        Ok(removed)
    }

    // == Keys ==
    pub fn keys(&self, namespace: &str) -> Result<BTreeSet<String>> {
        let slot = self.slot(namespace)?;
        let state = slot.state.lock();
        Ok(state.entries.keys().cloned().collect())
    }

    // == Clear ==
    /// Drops every entry and resets the namespace statistics.
    pub async fn clear(&self, namespace: &str) -> Result<usize> {
        let slot = self.slot(namespace)?;
        let removed = {
            let mut state = slot.state.lock();
            let removed = state.entries.len();
            *state = NamespaceState::default();
            removed
        };

        self.persist(slot).await?;
        info!(namespace, removed, "Cache namespace cleared");
        Ok(removed)
    }

    // == Remove Expired ==
    /// Deletes entries whose age reached the namespace `max_age`.
    pub async fn remove_expired(&self, namespace: &str, now: u64) -> Result<usize> {
        let slot = self.slot(namespace)?;
        let removed = {
            let mut state = slot.state.lock();
            let expired = expired_keys(&state.entries, now, slot.config.max_age_ms());
            for key in &expired {
                state.entries.remove(key);
            }
            state.stats.record_expirations(expired.len());
            let total = state.entries.len();
            state.stats.set_total_entries(total);
            expired.len()
        };

        if removed > 0 {
            self.persist(slot).await?;
        }
        Ok(removed)
    }

    pub fn record_stale_served(&self, namespace: &str) -> Result<()> {
        let slot = self.slot(namespace)?;
        slot.state.lock().stats.record_stale_served();
        Ok(())
    }

    // == Stats ==
    pub fn stats(&self, namespace: &str) -> Result<CacheStats> {
        let slot = self.slot(namespace)?;
        let state = slot.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        Ok(stats)
    }

    pub fn all_stats(&self) -> BTreeMap<String, CacheStats> {
        self.slots
            .keys()
            .filter_map(|name| self.stats(name).ok().map(|stats| (name.clone(), stats)))
            .collect()
    }

    // == Length ==
    pub fn len(&self, namespace: &str) -> Result<usize> {
        let slot = self.slot(namespace)?;
        let len = slot.state.lock().entries.len();
        Ok(len)
    }
}
