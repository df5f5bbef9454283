//! In-memory collaborators for exercising the ingestion loop without network or database.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::enrichment::{Analysis, Enricher, EnrichmentError};
use crate::ingest::progress::{run_topic, ProgressMessage, ProgressSink, ProgressStatus};
use crate::models::aggregates::SkillTotal;
use crate::models::job::{EnrichedJob, ExperienceLevel, JobPosting, ProviderTag, SkillGroup};
use crate::providers::{JobSource, ProviderError};
use crate::storage::{JobStore, SkillTaxonomy};

pub fn posting(tag: ProviderTag, id: &str, location: Option<&str>) -> JobPosting {
    let mut posting = JobPosting::new(tag, id, format!("{tag} job {id}"));
    posting.candidate_required_location = location.map(str::to_string);
    posting.description = format!("<p>Posting {id}</p>");
    posting
}

// ────────────────────────────────────────────────────────────────────────────
// Sources
// ────────────────────────────────────────────────────────────────────────────

/// Serves scripted pages; pages not scripted come back empty.
pub struct FakeSource {
    tag: ProviderTag,
    pages: Mutex<HashMap<u32, Result<Vec<JobPosting>, u16>>>,
    gate: Option<(u32, Arc<Notify>)>,
    calls: Arc<Mutex<Vec<u32>>>,
}

impl FakeSource {
    pub fn new(tag: ProviderTag) -> Self {
        Self {
            tag,
            pages: Mutex::new(HashMap::new()),
            gate: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn page(self, page: u32, postings: Vec<JobPosting>) -> Self {
        self.pages.lock().unwrap().insert(page, Ok(postings));
        self
    }

    pub fn failing_page(self, page: u32, status: u16) -> Self {
        self.pages.lock().unwrap().insert(page, Err(status));
        self
    }

    /// Blocks the fetch of `page` until `gate` is notified.
    pub fn gated(mut self, page: u32, gate: Arc<Notify>) -> Self {
        self.gate = Some((page, gate));
        self
    }

    /// Pages requested so far. The handle stays readable after the source is moved into deps.
    pub fn call_log(&self) -> Arc<Mutex<Vec<u32>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl JobSource for FakeSource {
    fn tag(&self) -> ProviderTag {
        self.tag
    }

    async fn fetch_page(
        &self,
        _query: &str,
        _page_size: u32,
        page: u32,
    ) -> Result<Vec<JobPosting>, ProviderError> {
        self.calls.lock().unwrap().push(page);
        if let Some((gated_page, gate)) = &self.gate {
            if *gated_page == page {
                gate.notified().await;
            }
        }

        let scripted = self.pages.lock().unwrap().get(&page).cloned();
        match scripted {
            Some(Ok(postings)) => Ok(postings),
            Some(Err(status)) => Err(ProviderError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Storage
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryJobStore {
    keys: Mutex<HashSet<String>>,
    saved: Mutex<Vec<EnrichedJob>>,
    seed_locations: Mutex<HashMap<Option<String>, u64>>,
    seed_skills: Mutex<HashMap<String, SkillTotal>>,
    fail_lookups: AtomicBool,
    fail_saves: AtomicBool,
    lookups: AtomicUsize,
}

impl InMemoryJobStore {
    pub fn with_keys<const N: usize>(keys: [&str; N]) -> Self {
        let store = Self::default();
        store
            .keys
            .lock()
            .unwrap()
            .extend(keys.iter().map(|k| k.to_string()));
        store
    }

    pub fn seed_location(&self, location: Option<&str>, count: u64) {
        self.seed_locations
            .lock()
            .unwrap()
            .insert(location.map(str::to_string), count);
    }

    pub fn seed_skill(&self, skill: &str, group: Option<&str>, total: u64) {
        self.seed_skills.lock().unwrap().insert(
            skill.to_string(),
            SkillTotal {
                group: group.map(str::to_string),
                total,
            },
        );
    }

    pub fn fail_key_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn key_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Vec<EnrichedJob> {
        self.saved.lock().unwrap().clone()
    }

    pub fn saved_keys(&self) -> Vec<String> {
        self.saved()
            .iter()
            .map(|job| job.posting.natural_key())
            .collect()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn existing_keys(&self, keys: &[String]) -> Result<HashSet<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        let stored = self.keys.lock().unwrap();
        Ok(keys.iter().filter(|k| stored.contains(*k)).cloned().collect())
    }

    async fn save_all(&self, jobs: &[EnrichedJob]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        let mut keys = self.keys.lock().unwrap();
        let mut saved = self.saved.lock().unwrap();
        for job in jobs {
            if keys.insert(job.posting.natural_key()) {
                saved.push(job.clone());
            }
        }
        Ok(())
    }

    async fn location_aggregates_for(&self, _query: &str) -> Result<HashMap<Option<String>, u64>> {
        Ok(self.seed_locations.lock().unwrap().clone())
    }

    async fn skill_aggregates_for(&self, _query: &str) -> Result<HashMap<String, SkillTotal>> {
        Ok(self.seed_skills.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct InMemoryTaxonomy {
    groups: Mutex<HashMap<String, String>>,
    saved: Mutex<Vec<SkillGroup>>,
}

impl InMemoryTaxonomy {
    pub fn with_groups<const N: usize>(groups: [(&str, &str); N]) -> Self {
        let taxonomy = Self::default();
        taxonomy.groups.lock().unwrap().extend(
            groups
                .iter()
                .map(|(skill, group)| (skill.to_string(), group.to_string())),
        );
        taxonomy
    }

    pub fn saved(&self) -> Vec<SkillGroup> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl SkillTaxonomy for InMemoryTaxonomy {
    async fn lookup_groups(&self, skills: &[String]) -> Result<Vec<SkillGroup>> {
        let groups = self.groups.lock().unwrap();
        Ok(skills
            .iter()
            .filter_map(|s| groups.get(s).map(|g| SkillGroup::new(s, g)))
            .collect())
    }

    async fn save_groups(&self, groups: &[SkillGroup]) -> Result<()> {
        let mut stored = self.groups.lock().unwrap();
        for group in groups {
            stored
                .entry(group.skill.clone())
                .or_insert_with(|| group.group.clone());
        }
        self.saved.lock().unwrap().extend_from_slice(groups);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Enrichment
// ────────────────────────────────────────────────────────────────────────────

/// Answers `analyze` from a queue of scripted results (default: mid-level, no skills)
/// and `classify` from a fixed mapping.
#[derive(Default)]
pub struct ScriptedEnricher {
    analyses: Mutex<VecDeque<Result<Analysis, u16>>>,
    groups: Mutex<HashMap<String, String>>,
    analyzed: Mutex<Vec<String>>,
    classify_calls: Mutex<Vec<Vec<String>>>,
    fail_classify: AtomicBool,
}

impl ScriptedEnricher {
    pub fn analysis(self, level: ExperienceLevel, skills: &[(&str, u32)]) -> Self {
        self.analyses.lock().unwrap().push_back(Ok(Analysis {
            experience_level: level,
            skills: skills.iter().map(|(s, l)| (s.to_string(), *l)).collect(),
        }));
        self
    }

    pub fn failing_analysis(self, status: u16) -> Self {
        self.analyses.lock().unwrap().push_back(Err(status));
        self
    }

    pub fn group(self, skill: &str, group: &str) -> Self {
        self.groups
            .lock()
            .unwrap()
            .insert(skill.to_string(), group.to_string());
        self
    }

    pub fn fail_classify(self) -> Self {
        self.fail_classify.store(true, Ordering::SeqCst);
        self
    }

    pub fn analyzed(&self) -> Vec<String> {
        self.analyzed.lock().unwrap().clone()
    }

    pub fn classify_calls(&self) -> Vec<Vec<String>> {
        self.classify_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Enricher for ScriptedEnricher {
    async fn analyze(&self, text: &str) -> Result<Analysis, EnrichmentError> {
        self.analyzed.lock().unwrap().push(text.to_string());
        let next = self.analyses.lock().unwrap().pop_front();
        match next {
            Some(Ok(analysis)) => Ok(analysis),
            Some(Err(status)) => Err(EnrichmentError::Api {
                status,
                message: "scripted failure".to_string(),
            }),
            None => Ok(Analysis::default()),
        }
    }

    async fn classify(&self, skills: &[String]) -> Result<HashMap<String, String>, EnrichmentError> {
        self.classify_calls.lock().unwrap().push(skills.to_vec());
        if self.fail_classify.load(Ordering::SeqCst) {
            return Err(EnrichmentError::RetriesExhausted { retries: 0 });
        }
        let groups = self.groups.lock().unwrap();
        Ok(skills
            .iter()
            .filter_map(|s| groups.get(s).map(|g| (s.clone(), g.clone())))
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Progress
// ────────────────────────────────────────────────────────────────────────────

/// Keeps every delivered message and forwards a copy to a channel tests can await on.
pub struct RecordingSink {
    messages: Mutex<Vec<(String, ProgressMessage)>>,
    tx: mpsc::UnboundedSender<ProgressMessage>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ProgressMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
                tx,
            }),
            rx,
        )
    }

    pub fn messages(&self) -> Vec<ProgressMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn statuses(&self) -> Vec<ProgressStatus> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                ProgressMessage::Status(status) => Some(status),
                ProgressMessage::ChartMap(_) => None,
            })
            .collect()
    }

    pub fn topics(&self) -> HashSet<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn deliver(&self, run_id: Uuid, message: &ProgressMessage) {
        self.messages
            .lock()
            .unwrap()
            .push((run_topic(run_id), message.clone()));
        let _ = self.tx.send(message.clone());
    }
}

/// Waits for the next message matching `pred`, skipping everything before it.
pub async fn next_matching(
    rx: &mut mpsc::UnboundedReceiver<ProgressMessage>,
    pred: impl Fn(&ProgressMessage) -> bool,
) -> ProgressMessage {
    let wait = async {
        while let Some(message) = rx.recv().await {
            if pred(&message) {
                return message;
            }
        }
        panic!("progress channel closed before the expected message arrived");
    };
    tokio::time::timeout(std::time::Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for progress message")
}
