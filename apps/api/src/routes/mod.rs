pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::ingest::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Ingestion runs
        .route("/api/v1/runs", post(handlers::handle_start_run))
        .route("/api/v1/runs/:id/stop", post(handlers::handle_stop_run))
        .route(
            "/api/v1/runs/:id/aggregates",
            get(handlers::handle_run_aggregates),
        )
        .route("/api/v1/runs/:id/events", get(handlers::handle_run_events))
        // Provider diagnostics
        .route(
            "/api/v1/providers/:tag/preview",
            get(handlers::handle_provider_preview),
        )
        .with_state(state)
}
