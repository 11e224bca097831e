//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::analyze::{analyze_stream, extract_stream};
use crate::handlers::hands::{get_hand, list_stream_hands};
use crate::handlers::health::{health, ready};
use crate::handlers::jobs::{create_job, get_job, reconcile};
use crate::middleware::{cors_layer, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // SSE pipeline runs
        .route("/analyze", post(analyze_stream))
        .route("/extract", post(extract_stream))
        // Async jobs on the external runner
        .route("/jobs", post(create_job))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/reconcile", post(reconcile))
        // Archive reads
        .route("/streams/:stream_id/hands", get(list_stream_hands))
        .route("/hands/:hand_id", get(get_hand));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
