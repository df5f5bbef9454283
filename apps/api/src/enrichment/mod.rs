//! Enrichment: seniority and skill extraction per posting, and skill-group classification.
//!
//! The ingestion loop only depends on the `Enricher` trait. `AnalyzerClient` is the HTTP
//! implementation talking to the analyzer service.

pub mod client;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::job::ExperienceLevel;

pub use client::{AnalyzerClient, RetryPolicy};

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Analyzer error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Analyzer still failing after {retries} retries")]
    RetriesExhausted { retries: u32 },
}

/// Result of analysing one posting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Analysis {
    pub experience_level: ExperienceLevel,
    /// Skill name -> proficiency weight (always > 0).
    pub skills: HashMap<String, u32>,
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Analysis, EnrichmentError>;

    /// Maps lowercase skill names to group labels. Skills the backend could not place are
    /// absent from the result.
    async fn classify(&self, skills: &[String]) -> Result<HashMap<String, String>, EnrichmentError>;
}

/// Builds the analyzer input: optional seniority hint, title, then cleaned description.
pub fn analysis_input(hint: Option<ExperienceLevel>, title: &str, description: &str) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(level) = hint {
        parts.push(format!("Seniority: {}", level.as_str()));
    }
    parts.push(title.trim().to_string());
    parts.push(description.trim().to_string());

    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
