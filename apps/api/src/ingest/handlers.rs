use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::errors::AppError;
use crate::ingest::pipeline::RunFilters;
use crate::models::aggregates::AggregateSnapshot;
use crate::models::job::{JobPosting, ProviderTag};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    /// Blank means unfiltered.
    #[serde(default)]
    pub query: String,
    pub page_size: Option<u32>,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StopRunResponse {
    pub stopped: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    pub query: Option<String>,
    pub page_size: Option<u32>,
}

fn positive(name: &str, value: Option<u32>, default: u32) -> Result<u32, AppError> {
    match value {
        Some(0) => Err(AppError::Validation(format!("{name} must be at least 1"))),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

/// POST /api/v1/runs
pub async fn handle_start_run(
    State(state): State<AppState>,
    Json(req): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<StartRunResponse>), AppError> {
    let page_size = positive("pageSize", req.page_size, state.config.default_page_size)?;
    let max_pages = positive("maxPages", req.max_pages, state.config.ingest_max_pages)?;

    let run_id = state
        .orchestrator
        .start(req.query.trim().to_string(), RunFilters::new(page_size, max_pages));
    Ok((StatusCode::ACCEPTED, Json(StartRunResponse { run_id })))
}

/// POST /api/v1/runs/:id/stop
pub async fn handle_stop_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<StopRunResponse> {
    let stopped = state.orchestrator.cancel(id).await;
    Json(StopRunResponse { stopped })
}

/// GET /api/v1/runs/:id/aggregates
pub async fn handle_run_aggregates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<Option<AggregateSnapshot>> {
    Json(state.orchestrator.current_aggregates(id))
}

/// GET /api/v1/runs/:id/events
pub async fn handle_run_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let rx = state.stream_hub.subscribe(id).await;

    let stream = BroadcastStream::new(rx).map(|result| match result {
        Ok(value) => {
            let event_type = value
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("message")
                .to_string();
            Ok::<_, Infallible>(Event::default().event(event_type).data(value.to_string()))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => Ok(Event::default()
            .event("lagged")
            .data(format!("{{\"skipped\":{skipped}}}"))),
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/v1/providers/:tag/preview
pub async fn handle_provider_preview(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Query(params): Query<PreviewQuery>,
) -> Result<Json<Vec<JobPosting>>, AppError> {
    let source = ProviderTag::parse(&tag)
        .and_then(|tag| state.orchestrator.deps().source(tag))
        .ok_or_else(|| AppError::NotFound(format!("Provider '{tag}' is not registered")))?;

    let page_size = positive("pageSize", params.page_size, state.config.default_page_size)?
        .min(RunFilters::MAX_PAGE_SIZE);
    let postings = match params.query.as_deref().map(str::trim) {
        Some(query) if !query.is_empty() => source.fetch_first(query, page_size).await?,
        _ => source.fetch_default().await?,
    };
    Ok(Json(postings))
}
