//! Offline Sync - an offline-first caching and sync engine
//!
//! Serves requests through per-namespace caching strategies, keeps responses
//! across restarts and replays writes that failed while offline once
//! connectivity returns.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod network;
pub mod policy;
pub mod storage;
pub mod sync;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheNamespace, NamespaceRegistry, Strategy};
pub use config::Config;
pub use engine::{Engine, EngineBuilder, EngineSettings};
pub use error::{EngineError, Result};
pub use events::EngineEvent;
pub use network::{HttpNetwork, Network, NetworkError, NetworkResponse, RequestDescriptor};
pub use policy::{EngineResponse, ResponseSource};
pub use storage::{DurableStore, FileStore, MemoryStore};
