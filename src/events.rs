//! Engine Events
//!
//! Advisory notifications for UI and observability collaborators. Events are
//! fanned out over a tokio broadcast channel; nobody is awaited and emitting
//! with no subscribers is fine.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

// == Engine Event ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    CacheHit {
        namespace: String,
        key: String,
    },
    CacheMiss {
        namespace: String,
        key: String,
    },
    StaleServed {
        namespace: String,
        key: String,
    },
    Revalidated {
        namespace: String,
        key: String,
    },
    RevalidationFailed {
        namespace: String,
        key: String,
        error: String,
    },
    SyncEnqueued {
        task_id: String,
        method: String,
        url: String,
    },
    SyncSucceeded {
        task_id: String,
    },
    SyncRetried {
        task_id: String,
        retry_count: u32,
    },
    SyncPermanentlyFailed {
        task_id: String,
        error: String,
    },
    CleanupCompleted {
        removed: BTreeMap<String, usize>,
    },
    ConnectivityChanged {
        online: bool,
        foreground: bool,
    },
}

impl EngineEvent {
    /// Wire name of the event, matching its serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::CacheHit { .. } => "cache-hit",
            EngineEvent::CacheMiss { .. } => "cache-miss",
            EngineEvent::StaleServed { .. } => "stale-served",
            EngineEvent::Revalidated { .. } => "revalidated",
            EngineEvent::RevalidationFailed { .. } => "revalidation-failed",
            EngineEvent::SyncEnqueued { .. } => "sync-enqueued",
            EngineEvent::SyncSucceeded { .. } => "sync-succeeded",
            EngineEvent::SyncRetried { .. } => "sync-retried",
            EngineEvent::SyncPermanentlyFailed { .. } => "sync-permanently-failed",
            EngineEvent::CleanupCompleted { .. } => "cleanup-completed",
            EngineEvent::ConnectivityChanged { .. } => "connectivity-changed",
        }
    }
}

// == Event Bus ==
/// Cloneable handle on the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: EngineEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "Event emitted"),
            Err(_) => debug!(event_type, "No receivers for event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
