//! Connectivity Monitor
//!
//! Tracks two independent axes, online/offline and foreground/background,
//! and drains the sync queue on the transitions that matter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{CleanupReport, ExpiryManager};
use crate::connectivity::ConnectivityProbe;
use crate::events::{EngineEvent, EventBus};
use crate::sync::{DrainReport, SyncQueue};
use crate::tasks::{spawn_cleanup_task, spawn_sync_task};

// == Connectivity State ==
/// Shared view of the current connectivity, read by the policy engine.
#[derive(Debug)]
pub struct ConnectivityState {
    online: AtomicBool,
    foreground: AtomicBool,
}

/// Point-in-time copy of [`ConnectivityState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivitySnapshot {
    pub online: bool,
    pub foreground: bool,
}

impl ConnectivityState {
    pub fn new(online: bool, foreground: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            foreground: AtomicBool::new(foreground),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        ConnectivitySnapshot {
            online: self.is_online(),
            foreground: self.is_foreground(),
        }
    }
}

impl Default for ConnectivityState {
    /// Assume a visible, connected process until told otherwise.
    fn default() -> Self {
        Self::new(true, true)
    }
}

// == Connectivity Monitor ==
pub struct ConnectivityMonitor {
    state: Arc<ConnectivityState>,
    sync_queue: Arc<SyncQueue>,
    expiry: Arc<ExpiryManager>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    events: EventBus,
}

impl ConnectivityMonitor {
    pub fn new(
        state: Arc<ConnectivityState>,
        sync_queue: Arc<SyncQueue>,
        expiry: Arc<ExpiryManager>,
        events: EventBus,
    ) -> Self {
        Self {
            state,
            sync_queue,
            expiry,
            probe: None,
            events,
        }
    }

    /// Lets `check_connectivity` observe the network instead of relying on
    /// explicit `set_online` calls.
    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn state(&self) -> ConnectivitySnapshot {
        self.state.snapshot()
    }

    fn announce(&self) {
        let snapshot = self.state.snapshot();
        info!(
            online = snapshot.online,
            foreground = snapshot.foreground,
            "Connectivity changed"
        );
        self.events.emit(EngineEvent::ConnectivityChanged {
            online: snapshot.online,
            foreground: snapshot.foreground,
        });
    }

    // == Set Online ==
    /// Records reachability. Going from offline to online drains the queue.
    pub async fn set_online(&self, online: bool) -> Option<DrainReport> {
        let was_online = self.state.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return None;
        }

        self.announce();
        if online {
            Some(self.sync_queue.drain().await)
        } else {
            None
        }
    }

    // == Set Foreground ==
    /// Records visibility. Returning to the foreground while online drains
    /// the queue.
    pub async fn set_foreground(&self, foreground: bool) -> Option<DrainReport> {
        let was_foreground = self.state.foreground.swap(foreground, Ordering::SeqCst);
        if was_foreground == foreground {
            return None;
        }

        self.announce();
        if foreground && self.state.is_online() {
            Some(self.sync_queue.drain().await)
        } else {
            None
        }
    }

    // == Check Connectivity ==
    /// Asks the probe, if any, and applies the result like `set_online`.
    pub async fn check_connectivity(&self) -> Option<DrainReport> {
        let probe = self.probe.as_ref()?;
        let online = probe.is_online().await;
        self.set_online(online).await
    }

    // == Tick ==
    /// One beat of the sync timer: re-check connectivity, then drain if
    /// online. Drains at most once per tick.
    pub async fn tick(&self) -> Option<DrainReport> {
        if let Some(report) = self.check_connectivity().await {
            return Some(report);
        }

        if self.state.is_online() {
            Some(self.sync_queue.drain().await)
        } else {
            debug!("Offline, skipping sync drain");
            None
        }
    }

    /// Runs the expiry pass now.
    pub async fn run_cleanup(&self) -> CleanupReport {
        self.expiry.run_cleanup().await
    }

    // == Start ==
    /// Spawns the sync timer and the cleanup timer. Both stop when
    /// `shutdown` is cancelled.
    pub fn start(
        self: &Arc<Self>,
        sync_interval: Duration,
        cleanup_interval: Duration,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        vec![
            spawn_sync_task(self.clone(), sync_interval, shutdown.clone()),
            spawn_cleanup_task(self.expiry.clone(), cleanup_interval, shutdown),
        ]
    }
}
