//! Request and Response models for the control API
//!
//! DTOs used for serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::{ConnectivityUpdate, FetchRequest};
pub use responses::{
    AllStatsResponse, ClearResponse, ConnectivityResponse, FetchResponse, HealthResponse,
    KeysResponse, NamespaceInfo, NamespacesResponse, StatsResponse,
};
