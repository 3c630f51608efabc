//! Sync Timer Task
//!
//! The periodic recovery path: even if an online or foreground transition
//! was missed, every tick re-checks connectivity and drains when online.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connectivity::ConnectivityMonitor;

/// Spawns the sync timer. Exits once `shutdown` is cancelled.
pub fn spawn_sync_task(
    monitor: Arc<ConnectivityMonitor>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting sync task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                report = monitor.tick() => {
                    if let Some(report) = report {
                        if report.attempted() > 0 {
                            debug!(attempted = report.attempted(), "Sync tick drained queue");
                        }
                    }
                }
            }
        }

        debug!("Sync task stopped");
    })
}
