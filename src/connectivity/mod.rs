//! Connectivity Module
//!
//! Online/offline and foreground/background tracking, probes, and the
//! monitor that turns transitions into sync drains.

mod monitor;
mod probe;

pub use monitor::{ConnectivityMonitor, ConnectivitySnapshot, ConnectivityState};
pub use probe::{ConnectivityProbe, HttpProbe};
