//! HTTP API.
//!
//! Exposes the pipeline as JSON endpoints for the main backend and the
//! web and mobile clients. `api_router()` returns a composable `Router`;
//! `start_api_server()` binds and serves it.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer, ApiSession};
pub use types::ApiContext;
