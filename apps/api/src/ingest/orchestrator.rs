use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::aggregates::AggregationStore;
use super::pipeline::{IngestDeps, IngestionRun, RunFilters};
use super::progress::ProgressStatus;
use crate::models::aggregates::AggregateSnapshot;

struct ActiveRun {
    cancel: CancellationToken,
    store: Arc<AggregationStore>,
    publish_lock: Arc<Mutex<()>>,
}

/// Owns the registry of active runs and spawns each run on its own task.
#[derive(Clone)]
pub struct Orchestrator {
    deps: Arc<IngestDeps>,
    runs: Arc<DashMap<Uuid, ActiveRun>>,
}

impl Orchestrator {
    pub fn new(deps: Arc<IngestDeps>) -> Self {
        Self {
            deps,
            runs: Arc::new(DashMap::new()),
        }
    }

    pub fn deps(&self) -> &IngestDeps {
        &self.deps
    }

    /// Registers a run and starts it in the background. Returns as soon as it is spawned.
    pub fn start(&self, query: String, filters: RunFilters) -> Uuid {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let store = Arc::new(AggregationStore::new());
        let run = IngestionRun::new(id, query, filters, self.deps.clone(), store.clone(), cancel.clone());

        // Registered before spawning so a fast run cannot finish before it is visible.
        self.runs.insert(
            id,
            ActiveRun {
                cancel,
                store,
                publish_lock: run.publish_lock(),
            },
        );

        let runs = self.runs.clone();
        tokio::spawn(async move {
            let outcome = run.execute().await;
            runs.remove(&id);
            info!(run_id = %id, ?outcome, "Run deregistered");
        });

        id
    }

    /// Stops a run. Returns `false` when the id is unknown or already finished.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let Some((_, run)) = self.runs.remove(&id) else {
            return false;
        };
        // Waits out an in-flight run event, so the notice below is the last one delivered.
        let _order = run.publish_lock.lock().await;
        run.cancel.cancel();
        info!(run_id = %id, "Run cancelled");
        self.deps
            .progress
            .publish_status(id, &ProgressStatus::cancelled())
            .await;
        true
    }

    /// Live totals of an active run; `None` for unknown, finished and cancelled runs alike.
    pub fn current_aggregates(&self, id: Uuid) -> Option<AggregateSnapshot> {
        self.runs
            .get(&id)
            .filter(|run| !run.cancel.is_cancelled())
            .map(|run| run.store.snapshot())
    }

    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }
}
