//! Configuration Module
//!
//! Loads engine and server settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Engine and server configuration.
///
/// Every value can be set via an environment variable; missing or
/// unparseable values fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Directory holding the durable blobs
    pub data_dir: PathBuf,
    /// Sync timer interval in seconds
    pub sync_interval: u64,
    /// Expiry cleanup interval in seconds
    pub cleanup_interval: u64,
    /// Timeout for each replayed request during a drain, in milliseconds
    pub sync_request_timeout_ms: u64,
    /// Events buffered per subscriber before it starts lagging
    pub event_capacity: usize,
    /// URL probed to decide connectivity; no probing when unset
    pub probe_url: Option<String>,
    /// Whether cache namespaces are persisted to the data directory
    pub persist_cache: bool,
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `DATA_DIR` - Durable storage directory (default: ./offline-sync-data)
    /// - `SYNC_INTERVAL` - Sync timer in seconds (default: 10)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1800)
    /// - `SYNC_REQUEST_TIMEOUT_MS` - Per-task drain timeout (default: 30000)
    /// - `EVENT_CAPACITY` - Event buffer size (default: 1024)
    /// - `PROBE_URL` - Connectivity probe target (default: unset)
    /// - `PERSIST_CACHE` - Persist cached responses (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            data_dir: env::var("DATA_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            sync_interval: parse_var("SYNC_INTERVAL")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.sync_interval),
            cleanup_interval: parse_var("CLEANUP_INTERVAL")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.cleanup_interval),
            sync_request_timeout_ms: parse_var("SYNC_REQUEST_TIMEOUT_MS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.sync_request_timeout_ms),
            event_capacity: parse_var("EVENT_CAPACITY")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.event_capacity),
            probe_url: env::var("PROBE_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            persist_cache: parse_var("PERSIST_CACHE").unwrap_or(defaults.persist_cache),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    pub fn sync_request_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_request_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            data_dir: PathBuf::from("./offline-sync-data"),
            sync_interval: 10,
            cleanup_interval: 1800,
            sync_request_timeout_ms: 30_000,
            event_capacity: 1024,
            probe_url: None,
            persist_cache: true,
        }
    }
}
