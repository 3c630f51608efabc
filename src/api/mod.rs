//! API Module
//!
//! HTTP handlers and routing for the engine's control API.
//!
//! # Endpoints
//! - `POST /fetch/:namespace` - Serve a request through the namespace strategy
//! - `GET /namespaces` - List the namespace registry
//! - `GET /stats`, `GET /stats/:namespace` - Cache statistics
//! - `GET /cache/:namespace/keys` - Keys held by a namespace
//! - `DELETE /cache/:namespace` - Clear a namespace
//! - `POST /cleanup` - Run expiry cleanup now
//! - `GET /sync` - Sync queue status
//! - `POST /sync/drain` - Drain the sync queue now
//! - `GET /connectivity`, `PUT /connectivity` - Read or set connectivity
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
