mod config;
mod db;
mod enrichment;
mod errors;
mod ingest;
mod models;
mod providers;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LocationLookup};
use crate::db::{create_pool, ensure_schema};
use crate::enrichment::{AnalyzerClient, RetryPolicy};
use crate::ingest::location::{LocationResolver, NominatimResolver, PassthroughResolver};
use crate::ingest::orchestrator::Orchestrator;
use crate::ingest::pipeline::IngestDeps;
use crate::ingest::progress::{HubSink, ProgressPublisher, ProgressSink, RedisSink};
use crate::ingest::stream_hub::StreamHub;
use crate::providers::adzuna::AdzunaCredentials;
use crate::providers::{
    build_http_client, AdzunaClient, JobSource, JoinriseClient, Provider, RemoteOkClient,
    RemotiveClient,
};
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::postgres::{PgJobStore, PgSkillTaxonomy};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME").replace('-', "_"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting OfferLens API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    ensure_schema(&db).await?;

    // Job boards
    let sources = build_sources(&config)?;
    info!(
        "Job boards: {}",
        sources
            .iter()
            .map(|s| s.tag().as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // Enrichment service
    let enricher = AnalyzerClient::new(
        &config.enrichment_url,
        Duration::from_secs(config.enrichment_timeout_secs),
        RetryPolicy {
            max_retries: config.enrichment_max_retries,
            delay: Duration::from_millis(config.enrichment_retry_delay_ms),
        },
    )?;
    info!("Enrichment client initialized ({})", config.enrichment_url);

    let locations: Arc<dyn LocationResolver> = match config.location_lookup {
        LocationLookup::Nominatim => Arc::new(NominatimResolver::new(Duration::from_secs(
            config.provider_timeout_secs,
        ))?),
        LocationLookup::Passthrough => Arc::new(PassthroughResolver),
    };
    info!("Location lookup: {:?}", config.location_lookup);

    // Progress transports
    let stream_hub = StreamHub::new();
    let mut sinks: Vec<Arc<dyn ProgressSink>> = vec![Arc::new(HubSink::new(stream_hub.clone()))];
    if let Some(redis_url) = &config.redis_url {
        let client = redis::Client::open(redis_url.as_str())?;
        match RedisSink::connect(&client).await {
            Ok(sink) => {
                sinks.push(Arc::new(sink));
                info!("Redis progress channel enabled");
            }
            Err(e) => warn!("Redis unavailable, progress goes to SSE only: {e}"),
        }
    }

    let deps = IngestDeps::new(
        sources,
        Arc::new(PgJobStore::new(db.clone())),
        Arc::new(PgSkillTaxonomy::new(db)),
        Arc::new(enricher),
        locations,
        ProgressPublisher::new(sinks),
    );
    let orchestrator = Orchestrator::new(Arc::new(deps));

    // Drop hub channels whose SSE clients went away
    let hub = stream_hub.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            hub.cleanup().await;
        }
    });

    // Build app state
    let state = AppState {
        orchestrator,
        stream_hub,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// One client per board, sharing a single HTTP connection pool. Adzuna needs credentials.
fn build_sources(config: &Config) -> Result<Vec<Arc<dyn JobSource>>> {
    let http = build_http_client(Duration::from_secs(config.provider_timeout_secs))?;

    let mut providers = vec![
        Provider::Remotive(RemotiveClient::new(http.clone())),
        Provider::RemoteOk(RemoteOkClient::new(http.clone())),
        Provider::Joinrise(JoinriseClient::new(http.clone())),
    ];
    match (&config.adzuna_app_id, &config.adzuna_app_key) {
        (Some(app_id), Some(app_key)) => providers.push(Provider::Adzuna(AdzunaClient::new(
            http,
            AdzunaCredentials {
                app_id: app_id.clone(),
                app_key: app_key.clone(),
                country: config.adzuna_country.clone(),
            },
        ))),
        _ => warn!("ADZUNA_APP_ID/ADZUNA_APP_KEY not set; Adzuna disabled"),
    }

    Ok(providers
        .into_iter()
        .map(|p| Arc::new(p) as Arc<dyn JobSource>)
        .collect())
}
