//! Cache Namespace Module
//!
//! Named cache configurations and the fixed registry built at start-up.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// == Strategy ==
/// Request-serving policy of a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    CacheOnly,
    NetworkOnly,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheOnly => "cache-only",
            Strategy::NetworkOnly => "network-only",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Cache Namespace ==
/// Configuration of one logical cache. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNamespace {
    pub name: String,
    pub strategy: Strategy,
    /// Age at which an entry stops being valid
    pub max_age: Duration,
    /// Eviction ceiling
    pub max_entries: usize,
    /// Upper bound on a single network attempt
    pub network_timeout: Duration,
}

impl CacheNamespace {
    pub fn new(
        name: impl Into<String>,
        strategy: Strategy,
        max_age: Duration,
        max_entries: usize,
        network_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            strategy,
            max_age,
            max_entries,
            network_timeout,
        }
    }

    pub fn max_age_ms(&self) -> u64 {
        self.max_age.as_millis() as u64
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "namespace name cannot be empty".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "namespace '{}': max_entries must be at least 1",
                self.name
            )));
        }
        if self.max_age.is_zero() || self.network_timeout.is_zero() {
            return Err(EngineError::InvalidConfig(format!(
                "namespace '{}': max_age and network_timeout must be non-zero",
                self.name
            )));
        }
        Ok(())
    }
}

// == Namespace Registry ==
/// Fixed set of namespaces, keyed by name.
#[derive(Debug, Clone)]
pub struct NamespaceRegistry {
    namespaces: BTreeMap<String, Arc<CacheNamespace>>,
}

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

impl NamespaceRegistry {
    /// Builds a registry, rejecting invalid or duplicate namespaces.
    pub fn new(namespaces: impl IntoIterator<Item = CacheNamespace>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for namespace in namespaces {
            namespace.validate()?;
            let name = namespace.name.clone();
            if map.insert(name.clone(), Arc::new(namespace)).is_some() {
                return Err(EngineError::InvalidConfig(format!(
                    "duplicate namespace '{name}'"
                )));
            }
        }
        Ok(Self { namespaces: map })
    }

    /// The application's built-in namespaces.
    pub fn builtin() -> Self {
        let namespaces = [
            CacheNamespace::new(
                "api-responses",
                Strategy::NetworkFirst,
                5 * MINUTE,
                100,
                Duration::from_secs(5),
            ),
            CacheNamespace::new(
                "static-assets",
                Strategy::CacheFirst,
                DAY,
                200,
                Duration::from_secs(10),
            ),
            CacheNamespace::new(
                "user-data",
                Strategy::StaleWhileRevalidate,
                HOUR,
                50,
                Duration::from_secs(5),
            ),
            CacheNamespace::new(
                "ml-models",
                Strategy::CacheFirst,
                7 * DAY,
                10,
                Duration::from_secs(60),
            ),
            CacheNamespace::new(
                "audio-files",
                Strategy::CacheFirst,
                DAY,
                50,
                Duration::from_secs(30),
            ),
        ];

        Self {
            namespaces: namespaces
                .into_iter()
                .map(|ns| (ns.name.clone(), Arc::new(ns)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<CacheNamespace>> {
        self.namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownNamespace(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CacheNamespace>> {
        self.namespaces.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
