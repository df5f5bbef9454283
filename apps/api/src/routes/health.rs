use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service version, the boards in use, runs in flight and runs being watched.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let providers: Vec<&str> = state
        .orchestrator
        .deps()
        .sources
        .iter()
        .map(|s| s.tag().as_str())
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "offerlens-api",
        "providers": providers,
        "activeRuns": state.orchestrator.active_runs(),
        "eventStreams": state.stream_hub.watched_runs().await
    }))
}
