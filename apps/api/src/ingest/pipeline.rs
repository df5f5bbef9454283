//! One ingestion run: the page loop from fetch to persist.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::aggregates::AggregationStore;
use super::dedup::filter_new;
use super::location::{normalize_locations, LocationResolver};
use super::progress::{ProgressPublisher, ProgressStatus};
use super::text::clean_description;
use crate::enrichment::{analysis_input, Enricher, EnrichmentError};
use crate::models::job::{EnrichedJob, JobPosting, ProviderTag, SkillGroup, SkillLevel};
use crate::providers::JobSource;
use crate::storage::{JobStore, SkillTaxonomy};

pub const DATABASE_ERROR: &str = "databaseError";
pub const SKILL_GROUPS_ERROR: &str = "skillGroupsError";

/// Everything a run talks to. Shared by all runs of one orchestrator.
pub struct IngestDeps {
    pub sources: Vec<Arc<dyn JobSource>>,
    pub jobs: Arc<dyn JobStore>,
    pub taxonomy: Arc<dyn SkillTaxonomy>,
    pub enricher: Arc<dyn Enricher>,
    pub locations: Arc<dyn LocationResolver>,
    pub progress: ProgressPublisher,
}

impl IngestDeps {
    pub fn new(
        mut sources: Vec<Arc<dyn JobSource>>,
        jobs: Arc<dyn JobStore>,
        taxonomy: Arc<dyn SkillTaxonomy>,
        enricher: Arc<dyn Enricher>,
        locations: Arc<dyn LocationResolver>,
        progress: ProgressPublisher,
    ) -> Self {
        // Page batches are merged in tag order regardless of registration order.
        sources.sort_by_key(|s| s.tag());
        Self {
            sources,
            jobs,
            taxonomy,
            enricher,
            locations,
            progress,
        }
    }

    pub fn source(&self, tag: ProviderTag) -> Option<&Arc<dyn JobSource>> {
        self.sources.iter().find(|s| s.tag() == tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFilters {
    /// Records requested from each provider per page.
    pub page_size: u32,
    /// Upper bound on pages; hitting it ends the run like an exhausted feed.
    pub max_pages: u32,
}

impl RunFilters {
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page_size: u32, max_pages: u32) -> Self {
        Self {
            page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE),
            max_pages: max_pages.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { pages: u32, saved: usize },
    Cancelled,
    Failed { tag: &'static str },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run cancelled")]
    Cancelled,

    #[error("posting analysis failed: {0}")]
    Analysis(#[source] EnrichmentError),

    #[error("skill classification failed: {0}")]
    Classification(#[source] EnrichmentError),

    #[error("dedup lookup failed: {0:#}")]
    Dedup(anyhow::Error),
}

impl RunError {
    /// Tag reported to observers in `errorMessage`.
    pub fn tag(&self) -> &'static str {
        match self {
            RunError::Cancelled => "cancelled",
            RunError::Analysis(_) => "aiProcessingError",
            RunError::Classification(_) => "aiGroupingError",
            RunError::Dedup(_) => "dedupError",
        }
    }
}

pub struct IngestionRun {
    id: Uuid,
    query: String,
    filters: RunFilters,
    deps: Arc<IngestDeps>,
    store: Arc<AggregationStore>,
    cancel: CancellationToken,
    /// Held while delivering an event; the terminal cancel event takes it too.
    publish_lock: Arc<Mutex<()>>,
    status: ProgressStatus,
    /// Error tags for the page in progress.
    errors: Vec<String>,
    saved: usize,
}

impl IngestionRun {
    pub fn new(
        id: Uuid,
        query: String,
        filters: RunFilters,
        deps: Arc<IngestDeps>,
        store: Arc<AggregationStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            query,
            filters,
            deps,
            store,
            cancel,
            publish_lock: Arc::new(Mutex::new(())),
            status: ProgressStatus::default(),
            errors: Vec::new(),
            saved: 0,
        }
    }

    /// Lock that orders this run's events against an external terminal event. Whoever
    /// cancels must hold it while cancelling and publishing, so nothing from the run
    /// can be delivered after the cancellation notice.
    pub fn publish_lock(&self) -> Arc<Mutex<()>> {
        self.publish_lock.clone()
    }

    pub async fn execute(mut self) -> RunOutcome {
        info!(run_id = %self.id, query = %self.query, page_size = self.filters.page_size, "Ingestion run started");
        self.seed().await;

        match self.drive().await {
            Ok(pages) => {
                self.publish_status(&ProgressStatus::default()).await;
                info!(run_id = %self.id, pages, saved = self.saved, "Ingestion run completed");
                RunOutcome::Completed {
                    pages,
                    saved: self.saved,
                }
            }
            Err(RunError::Cancelled) => {
                info!(run_id = %self.id, saved = self.saved, "Ingestion run cancelled");
                RunOutcome::Cancelled
            }
            Err(e) => {
                error!(run_id = %self.id, "Ingestion run failed: {e}");
                let tag = e.tag();
                self.errors.push(tag.to_string());
                self.publish_status(&ProgressStatus::failed(&self.errors)).await;
                RunOutcome::Failed { tag }
            }
        }
    }

    /// Starts the store from totals already committed for this query.
    async fn seed(&self) {
        let (locations, skills) = tokio::join!(
            self.deps.jobs.location_aggregates_for(&self.query),
            self.deps.jobs.skill_aggregates_for(&self.query)
        );
        let locations = locations.unwrap_or_else(|e| {
            warn!(run_id = %self.id, "Could not seed location totals: {e:#}");
            HashMap::new()
        });
        let skills = skills.unwrap_or_else(|e| {
            warn!(run_id = %self.id, "Could not seed skill totals: {e:#}");
            HashMap::new()
        });
        self.store.seed(locations, skills);
    }

    /// Runs pages until one yields nothing new. Returns the number of pages fetched.
    async fn drive(&mut self) -> Result<u32, RunError> {
        for page in 1..=self.filters.max_pages {
            self.errors.clear();
            self.status = ProgressStatus {
                updating_data_window_visible: true,
                downloading_data: true,
                downloaded_offers_number: self.status.downloaded_offers_number,
                processed_by_ai_number: self.status.processed_by_ai_number,
                ..ProgressStatus::default()
            };

            self.checkpoint()?;
            let fetched = self.fetch_all(page).await;

            self.checkpoint()?;
            let fresh = filter_new(fetched, self.deps.jobs.as_ref())
                .await
                .map_err(RunError::Dedup)?;

            for tag in ProviderTag::ALL {
                let count = fresh.iter().filter(|p| p.provider == tag).count() as u32;
                self.status.set_provider_count(tag, count);
            }
            self.status.downloaded_offers_number += fresh.len() as u32;
            self.emit_status().await;

            if fresh.is_empty() {
                debug!(run_id = %self.id, page, "No new postings; feed exhausted");
                return Ok(page);
            }
            info!(run_id = %self.id, page, new = fresh.len(), "Processing page");

            let cleaned = fresh
                .into_iter()
                .map(|mut posting| {
                    posting.description = clean_description(&posting.description);
                    posting
                })
                .collect();

            let mut enriched = self.enrich(cleaned).await?;

            self.checkpoint()?;
            self.resolve_skill_groups(&mut enriched).await?;

            self.checkpoint()?;
            self.aggregate_and_persist(enriched).await?;
        }

        warn!(run_id = %self.id, max_pages = self.filters.max_pages, "Page limit reached");
        Ok(self.filters.max_pages)
    }

    /// Fetches one page from every provider concurrently; results are joined in tag order.
    /// A failing provider contributes nothing and leaves an error tag.
    async fn fetch_all(&mut self, page: u32) -> Vec<JobPosting> {
        let query = self.query.as_str();
        let page_size = self.filters.page_size;
        let results = join_all(self.deps.sources.iter().map(|source| async move {
            (source.tag(), source.fetch_page(query, page_size, page).await)
        }))
        .await;

        let mut merged = Vec::new();
        for (tag, result) in results {
            match result {
                Ok(postings) => {
                    debug!(run_id = %self.id, provider = %tag, page, count = postings.len(), "Fetched");
                    merged.extend(postings);
                }
                Err(e) => {
                    warn!(run_id = %self.id, provider = %tag, page, "Fetch failed: {e}");
                    self.errors.push(tag.fetch_error_tag().to_string());
                }
            }
        }
        merged
    }

    async fn enrich(&mut self, postings: Vec<JobPosting>) -> Result<Vec<EnrichedJob>, RunError> {
        self.status.downloading_data = false;
        self.status.processing_by_ai = true;

        let mut enriched = Vec::with_capacity(postings.len());
        for posting in postings {
            self.checkpoint()?;

            let input = analysis_input(posting.level_hint, &posting.title, &posting.description);
            let analysis = self
                .deps
                .enricher
                .analyze(&input)
                .await
                .map_err(RunError::Analysis)?;

            let mut skills: Vec<SkillLevel> = analysis
                .skills
                .into_iter()
                .map(|(name, level)| SkillLevel {
                    name,
                    level,
                    group: None,
                })
                .collect();
            skills.sort_by(|a, b| a.name.cmp(&b.name));

            enriched.push(EnrichedJob {
                posting,
                experience_level: analysis.experience_level,
                skills,
            });

            self.status.processed_by_ai_number += 1;
            self.emit_status().await;
        }
        Ok(enriched)
    }

    /// Assigns a taxonomy group to every skill on the page. Stored groups are used first;
    /// the rest are classified in a single call and stored for later runs.
    async fn resolve_skill_groups(&mut self, jobs: &mut [EnrichedJob]) -> Result<(), RunError> {
        let names: Vec<String> = jobs
            .iter()
            .flat_map(|job| job.skills.iter().map(|s| s.name.trim().to_lowercase()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if names.is_empty() {
            return Ok(());
        }

        let mut lookup: HashMap<String, String> = match self.deps.taxonomy.lookup_groups(&names).await {
            Ok(groups) => groups
                .into_iter()
                .map(|g| (g.skill.to_lowercase(), g.group))
                .collect(),
            Err(e) => {
                warn!(run_id = %self.id, "Skill group lookup failed: {e:#}");
                self.errors.push(SKILL_GROUPS_ERROR.to_string());
                HashMap::new()
            }
        };

        let unresolved: Vec<String> = names
            .into_iter()
            .filter(|name| !lookup.contains_key(name))
            .collect();

        if !unresolved.is_empty() {
            let classified = self
                .deps
                .enricher
                .classify(&unresolved)
                .await
                .map_err(RunError::Classification)?;

            // Only answers for skills we asked about are trusted.
            let discovered: Vec<SkillGroup> = unresolved
                .iter()
                .filter_map(|skill| classified.get(skill).map(|group| SkillGroup::new(skill, group)))
                .collect();

            if discovered.len() < unresolved.len() {
                warn!(
                    run_id = %self.id,
                    requested = unresolved.len(),
                    classified = discovered.len(),
                    "Some skills were left without a group"
                );
            }

            if !discovered.is_empty() {
                if let Err(e) = self.deps.taxonomy.save_groups(&discovered).await {
                    warn!(run_id = %self.id, "Saving skill groups failed: {e:#}");
                    self.errors.push(SKILL_GROUPS_ERROR.to_string());
                }
                lookup.extend(discovered.into_iter().map(|g| (g.skill, g.group)));
            }
        }

        for job in jobs.iter_mut() {
            for skill in job.skills.iter_mut() {
                skill.group = lookup.get(&skill.name.trim().to_lowercase()).cloned();
            }
        }
        Ok(())
    }

    async fn aggregate_and_persist(&mut self, mut jobs: Vec<EnrichedJob>) -> Result<(), RunError> {
        normalize_locations(&mut jobs, self.deps.locations.as_ref()).await;

        self.checkpoint()?;
        self.store.merge(&jobs);
        {
            let _order = self.publish_lock.lock().await;
            if !self.cancel.is_cancelled() {
                self.deps
                    .progress
                    .publish_aggregates(self.id, &self.store.snapshot())
                    .await;
            }
        }

        self.status.processing_by_ai = false;
        self.checkpoint()?;
        match self.deps.jobs.save_all(&jobs).await {
            Ok(()) => {
                self.saved += jobs.len();
                self.status.saved_to_database = true;
            }
            Err(e) => {
                // The batch stays unstored, so a later run will pick these postings up again.
                error!(run_id = %self.id, batch = jobs.len(), "Saving postings failed: {e:#}");
                self.errors.push(DATABASE_ERROR.to_string());
                self.status.saved_to_database = false;
            }
        }
        self.emit_status().await;
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Publishes the current status with this page's error tags.
    async fn emit_status(&mut self) {
        self.status.error_message = self.errors.join(" ");
        self.publish_status(&self.status).await;
    }

    /// Silent once cancelled: the terminal event has already gone out and nothing may
    /// follow it.
    async fn publish_status(&self, status: &ProgressStatus) {
        let _order = self.publish_lock.lock().await;
        if self.cancel.is_cancelled() {
            return;
        }
        self.deps.progress.publish_status(self.id, status).await;
    }
}
