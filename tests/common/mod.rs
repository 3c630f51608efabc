//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use offline_sync::clock::ManualClock;
use parking_lot::Mutex;

use offline_sync::{
    CacheNamespace, Engine, EngineSettings, MemoryStore, NamespaceRegistry, Network, NetworkError,
    NetworkResponse, RequestDescriptor, Strategy,
};

pub const T0: u64 = 1_700_000_000_000;

type Outcome = Result<NetworkResponse, NetworkError>;

/// Network double: answers from a script, then with a default outcome.
pub struct ScriptedNetwork {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Outcome>,
    calls: AtomicUsize,
    seen: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(NetworkResponse::ok("ok"))),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn then(&self, outcome: Outcome) {
        self.script.lock().push_back(outcome);
    }

    pub fn always(&self, outcome: Outcome) {
        *self.fallback.lock() = outcome;
    }

    pub fn go_down(&self) {
        self.always(Err(NetworkError::Transport("network unreachable".into())));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn methods(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .map(|r| r.method.clone())
            .collect()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn send(&self, request: &RequestDescriptor, _timeout: Duration) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(request.clone());
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().clone())
    }
}

pub fn namespace(name: &str, strategy: Strategy, max_age_ms: u64, max_entries: usize) -> CacheNamespace {
    CacheNamespace::new(
        name,
        strategy,
        Duration::from_millis(max_age_ms),
        max_entries,
        Duration::from_secs(5),
    )
}

pub struct Harness {
    pub engine: Engine,
    pub network: Arc<ScriptedNetwork>,
    pub clock: Arc<ManualClock>,
    pub durable: Arc<MemoryStore>,
}

pub async fn harness(namespaces: Vec<CacheNamespace>) -> Harness {
    harness_with(namespaces, EngineSettings::default()).await
}

pub async fn harness_with(namespaces: Vec<CacheNamespace>, settings: EngineSettings) -> Harness {
    let network = ScriptedNetwork::new();
    let clock = Arc::new(ManualClock::new(T0));
    let durable = Arc::new(MemoryStore::new());
    let engine = Engine::builder(network.clone(), durable.clone())
        .with_registry(NamespaceRegistry::new(namespaces).expect("valid registry"))
        .with_clock(clock.clone())
        .with_settings(settings)
        .build()
        .await
        .expect("engine builds");
    Harness {
        engine,
        network,
        clock,
        durable,
    }
}
