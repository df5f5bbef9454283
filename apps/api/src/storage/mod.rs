//! Persistence boundaries used by the ingestion loop.
//!
//! The orchestrator only sees these traits; `postgres` holds the sqlx implementations.

pub mod postgres;

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::aggregates::SkillTotal;
use crate::models::job::{EnrichedJob, SkillGroup};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Returns the subset of `keys` (`"{PROVIDER}:{native_id}"`) already stored.
    async fn existing_keys(&self, keys: &[String]) -> Result<HashSet<String>>;

    /// Persists a page batch. Either every new record is committed or none is.
    async fn save_all(&self, jobs: &[EnrichedJob]) -> Result<()>;

    /// Stored location counts for postings matching `query`. `None` is "no location".
    async fn location_aggregates_for(&self, query: &str) -> Result<HashMap<Option<String>, u64>>;

    /// Stored per-skill level totals for postings matching `query`.
    async fn skill_aggregates_for(&self, query: &str) -> Result<HashMap<String, SkillTotal>>;
}

#[async_trait]
pub trait SkillTaxonomy: Send + Sync {
    /// Looks up groups for lowercase skill names; unknown skills are simply absent.
    async fn lookup_groups(&self, skills: &[String]) -> Result<Vec<SkillGroup>>;

    /// Stores new skill -> group pairs, leaving existing pairs untouched.
    async fn save_groups(&self, groups: &[SkillGroup]) -> Result<()>;
}
