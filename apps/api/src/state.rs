use crate::config::Config;
use crate::ingest::orchestrator::Orchestrator;
use crate::ingest::stream_hub::StreamHub;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Same hub the progress sink publishes into; SSE handlers subscribe here.
    pub stream_hub: StreamHub,
    pub config: Config,
}
