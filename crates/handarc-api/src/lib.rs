//! Axum HTTP API server.
//!
//! This crate provides:
//! - SSE endpoints that stream pipeline progress for short segments
//! - Job endpoints that bridge long segments to the external runner
//! - Read endpoints over the archived hands
//! - Request logging and CORS

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
