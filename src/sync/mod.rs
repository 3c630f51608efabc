//! Sync Module
//!
//! Deferred writes: failed write requests are queued here and replayed when
//! connectivity returns.

mod queue;
mod task;

pub use queue::{DrainReport, SyncQueue, SyncStatus, SYNC_QUEUE_BLOB};
pub use task::{priority_for_method, SyncTask, MAX_RETRIES};
