//! Expiry Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::ExpiryManager;

/// Spawns a background task that periodically runs the expiry pass.
///
/// The pass runs regardless of connectivity. The task sleeps for `interval`
/// between runs and exits once `shutdown` is cancelled.
///
/// # Example
/// ```ignore
/// let shutdown = CancellationToken::new();
/// let handle = spawn_cleanup_task(expiry.clone(), Duration::from_secs(1800), shutdown.clone());
/// // Later, during shutdown:
/// shutdown.cancel();
/// handle.await?;
/// ```
pub fn spawn_cleanup_task(
    expiry: Arc<ExpiryManager>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting expiry cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = expiry.run_cleanup() => {}
            }
        }

        debug!("Expiry cleanup task stopped");
    })
}
