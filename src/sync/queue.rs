//! Sync Queue Module
//!
//! Durable, priority-ordered queue of writes waiting for connectivity.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::network::{send_with_timeout, Network};
use crate::storage::DurableStore;
use crate::sync::SyncTask;

/// Blob key of the persisted queue.
pub const SYNC_QUEUE_BLOB: &str = "sync-queue";

// == Drain Report ==
/// Task ids grouped by the outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub succeeded: Vec<String>,
    pub retried: Vec<String>,
    pub permanently_failed: Vec<String>,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.retried.len() + self.permanently_failed.len()
    }

    /// Folds the outcome of a later pass into this one.
    pub fn merge(&mut self, other: DrainReport) {
        self.succeeded.extend(other.succeeded);
        self.retried.extend(other.retried);
        self.permanently_failed.extend(other.permanently_failed);
    }
}

// == Sync Status ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub pending_count: usize,
    pub tasks: Vec<SyncTask>,
}

// == Sync Queue ==
/// Single process-wide queue, sorted by descending priority (FIFO among
/// equal priorities) and persisted after every mutation.
pub struct SyncQueue {
    tasks: Mutex<Vec<SyncTask>>,
    durable: Arc<dyn DurableStore>,
    network: Arc<dyn Network>,
    events: EventBus,
    request_timeout: Duration,
}

impl SyncQueue {
    // == Constructor ==
    /// Creates an empty queue.
    pub fn new(
        durable: Arc<dyn DurableStore>,
        network: Arc<dyn Network>,
        events: EventBus,
        request_timeout: Duration,
    ) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            durable,
            network,
            events,
            request_timeout,
        }
    }

    // == Restore ==
    /// Creates a queue holding whatever was persisted by a previous process.
    ///
    /// A blob that cannot be decoded is an error: silently starting empty
    /// would drop the user's pending writes.
    pub async fn restore(
        durable: Arc<dyn DurableStore>,
        network: Arc<dyn Network>,
        events: EventBus,
        request_timeout: Duration,
    ) -> Result<Self> {
        let mut tasks: Vec<SyncTask> = match durable.load_blob(SYNC_QUEUE_BLOB).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                EngineError::Serialization(format!("persisted sync queue: {e}"))
            })?,
            None => Vec::new(),
        };
        tasks.retain(|task| !task.is_exhausted());
        tasks.sort_by_key(|task| Reverse(task.priority));

        info!("Sync queue restored with {} pending tasks", tasks.len());
        let queue = Self::new(durable, network, events, request_timeout);
        *queue.tasks.lock().await = tasks;
        Ok(queue)
    }

    async fn persist(&self, tasks: &[SyncTask]) -> Result<()> {
        let bytes = serde_json::to_vec(tasks)?;
        self.durable.save_blob(SYNC_QUEUE_BLOB, bytes).await
    }

    // == Enqueue ==
    /// Inserts a task behind every task of equal or higher priority, then
    /// persists the whole queue.
    ///
    /// The task stays queued in memory even if persisting fails.
    pub async fn enqueue(&self, task: SyncTask) -> Result<()> {
        let mut tasks = self.tasks.lock().await;

        let position = tasks
            .iter()
            .position(|queued| queued.priority < task.priority)
            .unwrap_or(tasks.len());
        let event = EngineEvent::SyncEnqueued {
            task_id: task.id.clone(),
            method: task.method.clone(),
            url: task.url.clone(),
        };
        info!(task_id = %task.id, method = %task.method, url = %task.url, "Write queued for sync");
        tasks.insert(position, task);

        let persisted = self.persist(&tasks).await;
        drop(tasks);

        self.events.emit(event);
        persisted
    }

    // == Drain ==
    /// Replays every pending task once, in priority order.
    ///
    /// The queue stays locked for the whole pass, so tasks enqueued meanwhile
    /// wait for the next pass. Every outcome is persisted before the next
    /// task is attempted, so a pass cancelled part-way never replays a
    /// delivered write after a restart.
    pub async fn drain(&self) -> DrainReport {
        let mut tasks = self.tasks.lock().await;
        let mut report = DrainReport::default();
        if tasks.is_empty() {
            return report;
        }

        debug!("Draining sync queue: {} tasks", tasks.len());
        let mut index = 0;
        while index < tasks.len() {
            let request = tasks[index].to_request();
            let outcome = send_with_timeout(self.network.as_ref(), &request, self.request_timeout).await;
            let task_id = tasks[index].id.clone();

            match outcome {
                Ok(_) => {
                    tasks.remove(index);
                    debug!(task_id = %task_id, "Sync task succeeded");
                    self.events.emit(EngineEvent::SyncSucceeded {
                        task_id: task_id.clone(),
                    });
                    report.succeeded.push(task_id);
                }
                Err(e) if e.is_transient() => {
                    if tasks[index].record_failure() {
                        tasks.remove(index);
                        self.report_permanent_failure(&task_id, &e);
                        report.permanently_failed.push(task_id);
                    } else {
                        let retry_count = tasks[index].retry_count;
                        warn!(task_id = %task_id, retry_count, error = %e, "Sync task will be retried");
                        self.events.emit(EngineEvent::SyncRetried {
                            task_id: task_id.clone(),
                            retry_count,
                        });
                        report.retried.push(task_id);
                        index += 1;
                    }
                }
                Err(e) => {
                    // The server answered; the error is final for this write
                    tasks.remove(index);
                    self.report_permanent_failure(&task_id, &e);
                    report.permanently_failed.push(task_id);
                }
            }

            if let Err(e) = self.persist(&tasks).await {
                warn!(error = %e, "Failed to persist sync queue during drain");
            }
        }

        info!(
            "Sync drain: {} succeeded, {} retried, {} permanently failed",
            report.succeeded.len(),
            report.retried.len(),
            report.permanently_failed.len()
        );
        report
    }

    fn report_permanent_failure(&self, task_id: &str, err: &EngineError) {
        error!(task_id, error = %err, "Sync task permanently failed");
        self.events.emit(EngineEvent::SyncPermanentlyFailed {
            task_id: task_id.to_string(),
            error: err.to_string(),
        });
    }

    // == Status ==
    pub async fn status(&self) -> SyncStatus {
        let tasks = self.tasks.lock().await;
        SyncStatus {
            pending_count: tasks.len(),
            tasks: tasks.clone(),
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
