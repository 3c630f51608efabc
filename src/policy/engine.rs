//! Policy Engine
//!
//! Routes each request through its namespace's strategy, deciding between
//! cache and network, writing successful responses through to the cache and
//! handing failed writes to the sync queue.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::response::{EngineResponse, ResponseSource};
use crate::cache::{
    request_key, validate_request, CacheEntry, CacheNamespace, CacheStore, Lookup, Strategy,
};
use crate::clock::Clock;
use crate::connectivity::ConnectivityState;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::network::{send_with_timeout, Network, NetworkResponse, RequestDescriptor};
use crate::sync::{SyncQueue, SyncTask};

type RevalidationSet = Arc<Mutex<HashSet<(String, String)>>>;

/// Removes a (namespace, key) pair from the in-flight set when the
/// revalidation finishes, however it finishes.
struct InFlight {
    set: RevalidationSet,
    marker: (String, String),
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.lock().remove(&self.marker);
    }
}

// == Policy Engine ==
/// Cheap to clone; clones share the cache, queue and in-flight set.
#[derive(Clone)]
pub struct PolicyEngine {
    cache: Arc<CacheStore>,
    network: Arc<dyn Network>,
    sync_queue: Arc<SyncQueue>,
    connectivity: Arc<ConnectivityState>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    revalidating: RevalidationSet,
    shutdown: CancellationToken,
}

impl PolicyEngine {
    pub fn new(
        cache: Arc<CacheStore>,
        network: Arc<dyn Network>,
        sync_queue: Arc<SyncQueue>,
        connectivity: Arc<ConnectivityState>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache,
            network,
            sync_queue,
            connectivity,
            events,
            clock,
            revalidating: Arc::new(Mutex::new(HashSet::new())),
            shutdown,
        }
    }

    // == Execute ==
    /// Serves `request` according to the strategy of `namespace`.
    ///
    /// Fails with `UnknownNamespace` or `InvalidRequest` before any cache or
    /// network access.
    pub async fn execute(&self, namespace: &str, request: RequestDescriptor) -> Result<EngineResponse> {
        let config = self.cache.namespace(namespace)?;
        validate_request(&request)?;

        debug!(
            namespace,
            strategy = %config.strategy,
            method = %request.method_upper(),
            url = %request.url,
            "Executing request"
        );

        match config.strategy {
            Strategy::CacheFirst => self.cache_first(&config, &request).await,
            Strategy::NetworkFirst => self.network_first(&config, &request).await,
            Strategy::CacheOnly => self.cache_only(&config, &request),
            Strategy::NetworkOnly => self.network_only(&config, &request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(config, request).await,
        }
    }

    /// Number of background revalidations currently running.
    pub fn revalidations_in_flight(&self) -> usize {
        self.revalidating.lock().len()
    }

    // == Strategies ==
    async fn cache_first(&self, ns: &CacheNamespace, request: &RequestDescriptor) -> Result<EngineResponse> {
        let key = request_key(request)?;
        if let Lookup::Fresh(entry) = self.consult(ns, &key)? {
            return Ok(EngineResponse::from_entry(entry, ResponseSource::Cache));
        }
        self.fetch_or_fallback(ns, key, request).await
    }

    async fn network_first(&self, ns: &CacheNamespace, request: &RequestDescriptor) -> Result<EngineResponse> {
        let key = request_key(request)?;
        match self.fetch(ns, request).await {
            Ok(response) => {
                self.store(ns, &key, &response).await;
                Ok(EngineResponse::from_network(response, Some(key)))
            }
            Err(err) => {
                if let Some(entry) = self.cache.get(&ns.name, &key)? {
                    warn!(namespace = %ns.name, key = %key, error = %err, "Network failed, serving cached entry");
                    return Ok(self.serve_stale(ns, entry));
                }
                self.defer_write(request, &err).await;
                Err(err)
            }
        }
    }

    fn cache_only(&self, ns: &CacheNamespace, request: &RequestDescriptor) -> Result<EngineResponse> {
        let key = request_key(request)?;
        match self.consult(ns, &key)? {
            Lookup::Fresh(entry) => Ok(EngineResponse::from_entry(entry, ResponseSource::Cache)),
            Lookup::Stale(entry) => Ok(self.serve_stale(ns, entry)),
            Lookup::Missing => Err(EngineError::NotFoundInCache {
                namespace: ns.name.clone(),
                key,
            }),
        }
    }

    async fn network_only(&self, ns: &CacheNamespace, request: &RequestDescriptor) -> Result<EngineResponse> {
        match self.fetch(ns, request).await {
            Ok(response) => Ok(EngineResponse::from_network(response, None)),
            Err(err) => {
                self.defer_write(request, &err).await;
                Err(err)
            }
        }
    }

    async fn stale_while_revalidate(
        &self,
        ns: Arc<CacheNamespace>,
        request: RequestDescriptor,
    ) -> Result<EngineResponse> {
        let key = request_key(&request)?;
        match self.consult(&ns, &key)? {
            Lookup::Fresh(entry) => {
                let response = EngineResponse::from_entry(entry, ResponseSource::Cache);
                self.spawn_revalidation(ns, key, request);
                Ok(response)
            }
            _ => self.fetch_or_fallback(&ns, key, &request).await,
        }
    }

    // == Helpers ==
    /// Looks the key up and reports the hit or miss.
    fn consult(&self, ns: &CacheNamespace, key: &str) -> Result<Lookup> {
        let lookup = self.cache.lookup(&ns.name, key, self.clock.now_ms())?;
        let namespace = ns.name.clone();
        let key = key.to_string();
        let event = match &lookup {
            Lookup::Fresh(_) => EngineEvent::CacheHit { namespace, key },
            _ => EngineEvent::CacheMiss { namespace, key },
        };
        self.events.emit(event);
        Ok(lookup)
    }

    /// Network call that writes through on success and falls back to any
    /// cached entry on failure.
    async fn fetch_or_fallback(
        &self,
        ns: &CacheNamespace,
        key: String,
        request: &RequestDescriptor,
    ) -> Result<EngineResponse> {
        match self.fetch(ns, request).await {
            Ok(response) => {
                self.store(ns, &key, &response).await;
                Ok(EngineResponse::from_network(response, Some(key)))
            }
            Err(err) if err.is_network_failure() => match self.cache.get(&ns.name, &key)? {
                Some(entry) => {
                    warn!(namespace = %ns.name, key = %key, error = %err, "Network failed, serving stale entry");
                    Ok(self.serve_stale(ns, entry))
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn fetch(&self, ns: &CacheNamespace, request: &RequestDescriptor) -> Result<NetworkResponse> {
        if !self.connectivity.is_online() {
            debug!(url = %request.url, "Offline, skipping network call");
            return Err(EngineError::TransportFailure("offline".to_string()));
        }
        send_with_timeout(self.network.as_ref(), request, ns.network_timeout).await
    }

    /// Write-through. The response has already been obtained, so a cache
    /// failure is logged and swallowed.
    async fn store(&self, ns: &CacheNamespace, key: &str, response: &NetworkResponse) {
        let entry = CacheEntry::from_response(key, response, self.clock.now_ms());
        if let Err(e) = self.cache.put(&ns.name, entry).await {
            warn!(namespace = %ns.name, key, error = %e, "Failed to write response to cache");
        }
    }

    fn serve_stale(&self, ns: &CacheNamespace, entry: CacheEntry) -> EngineResponse {
        if let Err(e) = self.cache.record_stale_served(&ns.name) {
            warn!(namespace = %ns.name, key = %entry.key, error = %e, "Failed to count stale response");
        }
        self.events.emit(EngineEvent::StaleServed {
            namespace: ns.name.clone(),
            key: entry.key.clone(),
        });
        EngineResponse::from_entry(entry, ResponseSource::StaleCache)
    }

    /// Queues a write whose network call failed transiently.
    async fn defer_write(&self, request: &RequestDescriptor, err: &EngineError) {
        if !request.is_write() || !err.is_transient() {
            return;
        }

        let task = SyncTask::from_request(request, self.clock.now_ms());
        let task_id = task.id.clone();
        match self.sync_queue.enqueue(task).await {
            Ok(()) => debug!(task_id = %task_id, error = %err, "Deferred write to sync queue"),
            Err(e) => warn!(task_id = %task_id, error = %e, "Failed to enqueue deferred write"),
        }
    }

    // == Revalidation ==
    /// Refreshes an entry in the background. At most one refresh runs per
    /// (namespace, key); later requests ride on the one in flight.
    fn spawn_revalidation(&self, ns: Arc<CacheNamespace>, key: String, request: RequestDescriptor) {
        let marker = (ns.name.clone(), key.clone());
        if !self.revalidating.lock().insert(marker.clone()) {
            debug!(namespace = %ns.name, key = %key, "Revalidation already in flight");
            return;
        }

        let guard = InFlight {
            set: self.revalidating.clone(),
            marker,
        };
        let engine = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            tokio::select! {
                _ = engine.shutdown.cancelled() => {
                    debug!(namespace = %ns.name, key = %key, "Revalidation abandoned on shutdown");
                }
                _ = engine.revalidate(&ns, &key, &request) => {}
            }
        });
    }

    async fn revalidate(&self, ns: &CacheNamespace, key: &str, request: &RequestDescriptor) {
        match self.fetch(ns, request).await {
            Ok(response) => {
                self.store(ns, key, &response).await;
                debug!(namespace = %ns.name, key, "Entry revalidated");
                self.events.emit(EngineEvent::Revalidated {
                    namespace: ns.name.clone(),
                    key: key.to_string(),
                });
            }
            Err(err) => {
                warn!(namespace = %ns.name, key, error = %err, "Revalidation failed");
                self.events.emit(EngineEvent::RevalidationFailed {
                    namespace: ns.name.clone(),
                    key: key.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::cache::NamespaceRegistry;
    use crate::clock::ManualClock;
    use crate::network::mock::MockNetwork;
    use crate::network::NetworkError;
    use crate::storage::MemoryStore;

    const T0: u64 = 1_000_000;

    struct Fixture {
        engine: PolicyEngine,
        cache: Arc<CacheStore>,
        network: Arc<MockNetwork>,
        queue: Arc<SyncQueue>,
        connectivity: Arc<ConnectivityState>,
        clock: Arc<ManualClock>,
        events: EventBus,
    }

    fn namespace(name: &str, strategy: Strategy) -> CacheNamespace {
        CacheNamespace::new(
            name,
            strategy,
            Duration::from_millis(5000),
            10,
            Duration::from_millis(1000),
        )
    }

    fn fixture() -> Fixture {
        fixture_with(ConnectivityState::default())
    }

    fn fixture_with(connectivity: ConnectivityState) -> Fixture {
        let registry = NamespaceRegistry::new([
            namespace("cf", Strategy::CacheFirst),
            namespace("nf", Strategy::NetworkFirst),
            namespace("co", Strategy::CacheOnly),
            namespace("no", Strategy::NetworkOnly),
            namespace("swr", Strategy::StaleWhileRevalidate),
        ])
        .unwrap();
        let cache = Arc::new(CacheStore::new(&registry));
        let network = Arc::new(MockNetwork::new());
        let events = EventBus::new(64);
        let queue = Arc::new(SyncQueue::new(
            Arc::new(MemoryStore::new()),
            network.clone(),
            events.clone(),
            Duration::from_secs(30),
        ));
        let connectivity = Arc::new(connectivity);
        let clock = Arc::new(ManualClock::new(T0));
        let engine = PolicyEngine::new(
            cache.clone(),
            network.clone(),
            queue.clone(),
            connectivity.clone(),
            events.clone(),
            clock.clone(),
            CancellationToken::new(),
        );
        Fixture {
            engine,
            cache,
            network,
            queue,
            connectivity,
            clock,
            events,
        }
    }

    fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<&'static str> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event.event_type());
        }
        seen
    }

    async fn seed(f: &Fixture, ns: &str, url: &str, body: &str, stored_at: u64) {
        let key = request_key(&RequestDescriptor::get(url)).unwrap();
        f.cache
            .put(ns, CacheEntry::from_response(key, &NetworkResponse::ok(body), stored_at))
            .await
            .unwrap();
    }

    // == Cache First ==

    #[tokio::test]
    async fn test_cache_first_serves_fresh_then_refetches_after_expiry() {
        let f = fixture();
        let request = RequestDescriptor::get("https://api.example.com/a");
        f.network.respond_with(NetworkResponse::ok("A"));

        let first = f.engine.execute("cf", request.clone()).await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(first.body, b"A");
        assert_eq!(f.network.calls(), 1);

        f.clock.set(T0 + 3000);
        let second = f.engine.execute("cf", request.clone()).await.unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.body, b"A");
        assert_eq!(f.network.calls(), 1, "Fresh entry must not hit the network");

        f.clock.set(T0 + 6000);
        let third = f.engine.execute("cf", request).await.unwrap();
        assert_eq!(third.source, ResponseSource::Network);
        assert_eq!(f.network.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_first_falls_back_to_stale_entry() {
        let f = fixture();
        seed(&f, "cf", "https://api.example.com/a", "old", T0).await;
        f.clock.set(T0 + 10_000);
        f.network.fail_with(NetworkError::Transport("connection refused".into()));
        let mut rx = f.events.subscribe();

        let response = f
            .engine
            .execute("cf", RequestDescriptor::get("https://api.example.com/a"))
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::StaleCache);
        assert!(response.is_stale());
        assert_eq!(response.body, b"old");
        assert_eq!(drain_events(&mut rx), vec!["cache-miss", "stale-served"]);
        assert_eq!(f.cache.stats("cf").unwrap().stale_served, 1);
    }

    #[tokio::test]
    async fn test_cache_first_propagates_failure_without_entry() {
        let f = fixture();
        f.network.fail_with(NetworkError::Transport("dns".into()));

        let err = f
            .engine
            .execute("cf", RequestDescriptor::get("https://api.example.com/missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::TransportFailure(_)));
    }

    #[tokio::test]
    async fn test_non_success_response_is_not_cached() {
        let f = fixture();
        f.network.respond_with(NetworkResponse::new(500, "boom"));

        let err = f
            .engine
            .execute("cf", RequestDescriptor::get("https://api.example.com/a"))
            .await
            .unwrap_err();

        assert_eq!(err, EngineError::Upstream { status: 500 });
        assert_eq!(f.cache.len("cf").unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_cache_untouched() {
        let f = fixture();
        f.network.set_delay(Duration::from_secs(5));

        let err = f
            .engine
            .execute("cf", RequestDescriptor::get("https://api.example.com/slow"))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::NetworkTimeout(_)));
        assert_eq!(f.cache.len("cf").unwrap(), 0);
    }

    // == Network First ==

    #[tokio::test]
    async fn test_network_first_writes_through() {
        let f = fixture();
        f.network.respond_with(NetworkResponse::ok("fresh").with_content_type("application/json"));

        let response = f
            .engine
            .execute("nf", RequestDescriptor::get("https://api.example.com/a"))
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        let key = response.key.unwrap();
        let entry = f.cache.get("nf", &key).unwrap().unwrap();
        assert_eq!(entry.payload.body, b"fresh");
        assert_eq!(entry.stored_at, T0);
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache() {
        let f = fixture();
        seed(&f, "nf", "https://api.example.com/a", "cached", T0).await;
        f.network.fail_with(NetworkError::Timeout(Duration::from_secs(1)));

        let response = f
            .engine
            .execute("nf", RequestDescriptor::get("https://api.example.com/a"))
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::StaleCache);
        assert_eq!(response.body, b"cached");
        assert!(f.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_network_first_defers_failed_write() {
        let f = fixture();
        f.network.fail_with(NetworkError::Transport("unreachable".into()));
        let request = RequestDescriptor::new("POST", "https://api.example.com/items").with_body("{}");

        let err = f.engine.execute("nf", request).await.unwrap_err();

        assert!(err.is_transient());
        let status = f.queue.status().await;
        assert_eq!(status.pending_count, 1);
        assert_eq!(status.tasks[0].method, "POST");
        assert_eq!(status.tasks[0].body.as_deref(), Some(&b"{}"[..]));
    }

    #[tokio::test]
    async fn test_failed_read_is_not_queued() {
        let f = fixture();
        f.network.fail_with(NetworkError::Transport("unreachable".into()));

        f.engine
            .execute("nf", RequestDescriptor::get("https://api.example.com/a"))
            .await
            .unwrap_err();

        assert!(f.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_upstream_rejection_is_not_queued() {
        let f = fixture();
        f.network.respond_with(NetworkResponse::new(422, "invalid"));

        let err = f
            .engine
            .execute("no", RequestDescriptor::new("PUT", "https://api.example.com/items/1"))
            .await
            .unwrap_err();

        assert_eq!(err, EngineError::Upstream { status: 422 });
        assert!(f.queue.is_empty().await);
    }

    // == Cache Only ==

    #[tokio::test]
    async fn test_cache_only_never_touches_network() {
        let f = fixture();
        seed(&f, "co", "https://cdn.example.com/logo.png", "png", T0).await;

        let hit = f
            .engine
            .execute("co", RequestDescriptor::get("https://cdn.example.com/logo.png"))
            .await
            .unwrap();
        assert_eq!(hit.source, ResponseSource::Cache);

        let err = f
            .engine
            .execute("co", RequestDescriptor::get("https://cdn.example.com/missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFoundInCache { .. }));
        assert_eq!(f.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_only_serves_expired_entry_as_stale() {
        let f = fixture();
        seed(&f, "co", "https://cdn.example.com/logo.png", "png", T0).await;
        f.clock.set(T0 + 60_000);

        let response = f
            .engine
            .execute("co", RequestDescriptor::get("https://cdn.example.com/logo.png"))
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::StaleCache);
        assert_eq!(f.network.calls(), 0);
    }

    // == Network Only ==

    #[tokio::test]
    async fn test_network_only_never_caches() {
        let f = fixture();
        let response = f
            .engine
            .execute("no", RequestDescriptor::get("https://api.example.com/live"))
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.key, None);
        assert_eq!(f.cache.len("no").unwrap(), 0);
        assert_eq!(f.cache.stats("no").unwrap().misses, 0);
    }

    #[tokio::test]
    async fn test_offline_short_circuits_and_queues_write() {
        let f = fixture_with(ConnectivityState::new(false, true));
        assert!(!f.connectivity.is_online());
        let mut rx = f.events.subscribe();

        let err = f
            .engine
            .execute("no", RequestDescriptor::new("POST", "https://api.example.com/items"))
            .await
            .unwrap_err();

        assert_eq!(err, EngineError::TransportFailure("offline".into()));
        assert_eq!(f.network.calls(), 0);
        assert_eq!(f.queue.len().await, 1);
        assert_eq!(drain_events(&mut rx), vec!["sync-enqueued"]);
    }

    // == Stale While Revalidate ==

    #[tokio::test(start_paused = true)]
    async fn test_swr_returns_cached_value_without_waiting() {
        let f = fixture();
        seed(&f, "swr", "https://api.example.com/feed", "old", T0).await;
        f.network.respond_with(NetworkResponse::ok("new"));
        f.network.set_delay(Duration::from_millis(500));
        let mut rx = f.events.subscribe();

        let started = tokio::time::Instant::now();
        let response = f
            .engine
            .execute("swr", RequestDescriptor::get("https://api.example.com/feed"))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"old");
        assert_eq!(f.engine.revalidations_in_flight(), 1);

        loop {
            let event = rx.recv().await.unwrap();
            if matches!(event, EngineEvent::Revalidated { .. }) {
                break;
            }
        }

        let key = response.key.unwrap();
        let entry = f.cache.get("swr", &key).unwrap().unwrap();
        assert_eq!(entry.payload.body, b"new");
        assert_eq!(f.network.calls(), 1);
        tokio::task::yield_now().await;
        assert_eq!(f.engine.revalidations_in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swr_deduplicates_revalidation() {
        let f = fixture();
        seed(&f, "swr", "https://api.example.com/feed", "old", T0).await;
        f.network.set_delay(Duration::from_millis(500));
        let request = RequestDescriptor::get("https://api.example.com/feed");

        for _ in 0..3 {
            let response = f.engine.execute("swr", request.clone()).await.unwrap();
            assert_eq!(response.body, b"old");
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(f.network.calls(), 1);
    }

    #[tokio::test]
    async fn test_swr_failure_keeps_entry_and_reports() {
        let f = fixture();
        seed(&f, "swr", "https://api.example.com/feed", "old", T0).await;
        f.network.fail_with(NetworkError::Transport("reset".into()));
        let mut rx = f.events.subscribe();

        let response = f
            .engine
            .execute("swr", RequestDescriptor::get("https://api.example.com/feed"))
            .await
            .unwrap();
        assert_eq!(response.body, b"old");

        loop {
            let event = rx.recv().await.unwrap();
            if let EngineEvent::RevalidationFailed { error, .. } = event {
                assert!(error.contains("reset"));
                break;
            }
        }
        let key = response.key.unwrap();
        assert_eq!(f.cache.get("swr", &key).unwrap().unwrap().payload.body, b"old");
    }

    #[tokio::test]
    async fn test_swr_without_fresh_entry_fetches_inline() {
        let f = fixture();
        f.network.respond_with(NetworkResponse::ok("first"));

        let response = f
            .engine
            .execute("swr", RequestDescriptor::get("https://api.example.com/feed"))
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body, b"first");
        assert_eq!(f.engine.revalidations_in_flight(), 0);
    }

    // == Validation ==

    #[tokio::test]
    async fn test_rejects_unknown_namespace_and_invalid_request() {
        let f = fixture();

        let err = f
            .engine
            .execute("nope", RequestDescriptor::get("https://api.example.com"))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownNamespace("nope".into()));

        let err = f.engine.execute("cf", RequestDescriptor::get("  ")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert_eq!(f.network.calls(), 0);
    }
}
