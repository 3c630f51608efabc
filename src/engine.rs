//! Engine
//!
//! Wires the cache store, policy engine, sync queue and connectivity
//! monitor together behind one handle. Everything the engine depends on
//! from the outside world (network, durable storage, clock, probe) is
//! injected through [`EngineBuilder`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::{CacheStats, CacheStore, CleanupReport, ExpiryManager, NamespaceRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe, ConnectivitySnapshot, ConnectivityState};
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::network::{Network, RequestDescriptor};
use crate::policy::{EngineResponse, PolicyEngine};
use crate::storage::DurableStore;
use crate::sync::{DrainReport, SyncQueue, SyncStatus};

// == Settings ==
/// Runtime knobs of an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub sync_interval: Duration,
    pub cleanup_interval: Duration,
    pub sync_request_timeout: Duration,
    pub event_capacity: usize,
    /// When false the cache lives in memory only; the sync queue is always
    /// persisted.
    pub persist_cache: bool,
    pub initial_connectivity: ConnectivitySnapshot,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            sync_interval: config.sync_interval(),
            cleanup_interval: config.cleanup_interval(),
            sync_request_timeout: config.sync_request_timeout(),
            event_capacity: config.event_capacity,
            persist_cache: config.persist_cache,
            initial_connectivity: ConnectivitySnapshot {
                online: true,
                foreground: true,
            },
        }
    }
}

// == Builder ==
pub struct EngineBuilder {
    network: Arc<dyn Network>,
    durable: Arc<dyn DurableStore>,
    registry: NamespaceRegistry,
    clock: Arc<dyn Clock>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    settings: EngineSettings,
}

impl EngineBuilder {
    /// Starts a builder with the built-in namespaces, the system clock and
    /// no connectivity probe.
    pub fn new(network: Arc<dyn Network>, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            network,
            durable,
            registry: NamespaceRegistry::builtin(),
            clock: Arc::new(SystemClock),
            probe: None,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_registry(mut self, registry: NamespaceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Restores persisted state and assembles the engine.
    ///
    /// Fails only if the persisted sync queue cannot be read back.
    pub async fn build(self) -> Result<Engine> {
        let settings = self.settings;
        let events = EventBus::new(settings.event_capacity);
        let shutdown = CancellationToken::new();

        let cache = Arc::new(if settings.persist_cache {
            CacheStore::restore(&self.registry, self.durable.clone()).await
        } else {
            CacheStore::new(&self.registry)
        });
        let sync_queue = Arc::new(
            SyncQueue::restore(
                self.durable.clone(),
                self.network.clone(),
                events.clone(),
                settings.sync_request_timeout,
            )
            .await?,
        );
        let connectivity = Arc::new(ConnectivityState::new(
            settings.initial_connectivity.online,
            settings.initial_connectivity.foreground,
        ));
        let expiry = Arc::new(ExpiryManager::new(
            cache.clone(),
            events.clone(),
            self.clock.clone(),
        ));

        let mut monitor = ConnectivityMonitor::new(
            connectivity.clone(),
            sync_queue.clone(),
            expiry,
            events.clone(),
        );
        if let Some(probe) = self.probe {
            monitor = monitor.with_probe(probe);
        }

        let policy = PolicyEngine::new(
            cache.clone(),
            self.network,
            sync_queue.clone(),
            connectivity,
            events.clone(),
            self.clock,
            shutdown.clone(),
        );

        info!(
            namespaces = self.registry.len(),
            persist_cache = settings.persist_cache,
            "Engine initialized"
        );

        Ok(Engine {
            registry: self.registry,
            cache,
            policy,
            sync_queue,
            monitor: Arc::new(monitor),
            events,
            settings,
            shutdown,
        })
    }
}

// == Engine ==
pub struct Engine {
    registry: NamespaceRegistry,
    cache: Arc<CacheStore>,
    policy: PolicyEngine,
    sync_queue: Arc<SyncQueue>,
    monitor: Arc<ConnectivityMonitor>,
    events: EventBus,
    settings: EngineSettings,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn builder(network: Arc<dyn Network>, durable: Arc<dyn DurableStore>) -> EngineBuilder {
        EngineBuilder::new(network, durable)
    }

    /// Serves a request through the strategy of `namespace`.
    pub async fn execute(&self, namespace: &str, request: RequestDescriptor) -> Result<EngineResponse> {
        self.policy.execute(namespace, request).await
    }

    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn sync_queue(&self) -> &Arc<SyncQueue> {
        &self.sync_queue
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        self.cache.all_stats()
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.sync_queue.status().await
    }

    pub async fn drain(&self) -> DrainReport {
        self.sync_queue.drain().await
    }

    pub async fn run_cleanup(&self) -> CleanupReport {
        self.monitor.run_cleanup().await
    }

    pub fn connectivity(&self) -> ConnectivitySnapshot {
        self.monitor.state()
    }

    // == Lifecycle ==
    /// Spawns the sync and cleanup timers.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!(
            sync_interval_secs = self.settings.sync_interval.as_secs(),
            cleanup_interval_secs = self.settings.cleanup_interval.as_secs(),
            "Starting background tasks"
        );
        self.monitor.start(
            self.settings.sync_interval,
            self.settings.cleanup_interval,
            self.shutdown.clone(),
        )
    }

    /// Stops timers and in-flight revalidations. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Engine shutting down");
            self.shutdown.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheNamespace, Strategy};
    use crate::clock::ManualClock;
    use crate::network::mock::MockNetwork;
    use crate::network::{NetworkError, NetworkResponse};
    use crate::policy::ResponseSource;
    use crate::storage::MemoryStore;
    use crate::sync::SYNC_QUEUE_BLOB;

    fn registry() -> NamespaceRegistry {
        NamespaceRegistry::new([
            CacheNamespace::new(
                "api-responses",
                Strategy::NetworkFirst,
                Duration::from_secs(300),
                100,
                Duration::from_secs(10),
            ),
            CacheNamespace::new(
                "user-data",
                Strategy::NetworkOnly,
                Duration::from_secs(60),
                10,
                Duration::from_secs(10),
            ),
        ])
        .unwrap()
    }

    async fn build(network: Arc<MockNetwork>, durable: Arc<MemoryStore>) -> Engine {
        Engine::builder(network, durable)
            .with_registry(registry())
            .with_clock(Arc::new(ManualClock::new(1_000)))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_cache_survives_restart() {
        let durable = Arc::new(MemoryStore::new());
        let network = Arc::new(MockNetwork::new());
        network.respond_with(NetworkResponse::ok("profile"));
        let request = RequestDescriptor::get("https://api.example.com/me");

        let engine = build(network.clone(), durable.clone()).await;
        engine.execute("api-responses", request.clone()).await.unwrap();
        drop(engine);

        network.fail_with(NetworkError::Transport("offline".into()));
        let engine = build(network, durable).await;
        let response = engine.execute("api-responses", request).await.unwrap();

        assert_eq!(response.source, ResponseSource::StaleCache);
        assert_eq!(response.body, b"profile");
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let durable = Arc::new(MemoryStore::new());
        let network = Arc::new(MockNetwork::new());
        network.fail_with(NetworkError::Timeout(Duration::from_secs(10)));

        let engine = build(network.clone(), durable.clone()).await;
        engine
            .execute("user-data", RequestDescriptor::new("DELETE", "https://api.example.com/x/1"))
            .await
            .unwrap_err();
        drop(engine);

        let engine = build(network, durable).await;
        let status = engine.sync_status().await;
        assert_eq!(status.pending_count, 1);
        assert_eq!(status.tasks[0].method, "DELETE");
    }

    #[tokio::test]
    async fn test_corrupt_queue_fails_build() {
        let durable = Arc::new(MemoryStore::new());
        durable
            .save_blob(SYNC_QUEUE_BLOB, b"not json".to_vec())
            .await
            .unwrap();

        let result = Engine::builder(Arc::new(MockNetwork::new()), durable)
            .build()
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_memory_only_cache_is_not_persisted() {
        let durable = Arc::new(MemoryStore::new());
        let network = Arc::new(MockNetwork::new());
        let settings = EngineSettings {
            persist_cache: false,
            ..EngineSettings::default()
        };
        let engine = Engine::builder(network, durable.clone())
            .with_registry(registry())
            .with_settings(settings)
            .build()
            .await
            .unwrap();

        engine
            .execute("api-responses", RequestDescriptor::get("https://api.example.com/me"))
            .await
            .unwrap();

        assert!(durable.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_timers() {
        let engine = build(Arc::new(MockNetwork::new()), Arc::new(MemoryStore::new())).await;
        let handles = engine.start();
        assert_eq!(handles.len(), 2);

        engine.shutdown();
        engine.shutdown();
        assert!(engine.is_shut_down());
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_starts_offline_when_configured() {
        let network = Arc::new(MockNetwork::new());
        let settings = EngineSettings {
            initial_connectivity: ConnectivitySnapshot {
                online: false,
                foreground: true,
            },
            ..EngineSettings::default()
        };
        let engine = Engine::builder(network.clone(), Arc::new(MemoryStore::new()))
            .with_registry(registry())
            .with_settings(settings)
            .build()
            .await
            .unwrap();

        assert!(!engine.connectivity().online);
        engine
            .execute("api-responses", RequestDescriptor::get("https://api.example.com/me"))
            .await
            .unwrap_err();
        assert_eq!(network.calls(), 0);
    }
}
