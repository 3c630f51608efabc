//! Background Tasks Module
//!
//! Timers that run while the engine is up.
//!
//! # Tasks
//! - Sync: re-checks connectivity and drains the sync queue when online
//! - Expiry Cleanup: removes expired cache entries at a fixed interval

mod cleanup;
mod sync;

pub use cleanup::spawn_cleanup_task;
pub use sync::spawn_sync_task;
