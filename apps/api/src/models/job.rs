use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of job boards the ingester pulls from.
/// Declaration order is the order providers appear in a merged page batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderTag {
    Remotive,
    RemoteOk,
    Adzuna,
    Joinrise,
}

impl ProviderTag {
    pub const ALL: [ProviderTag; 4] = [
        ProviderTag::Remotive,
        ProviderTag::RemoteOk,
        ProviderTag::Adzuna,
        ProviderTag::Joinrise,
    ];

    /// Stored in the `api_name` column and used as the natural key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::Remotive => "REMOTIVE",
            ProviderTag::RemoteOk => "REMOTEOK",
            ProviderTag::Adzuna => "ADZUNA",
            ProviderTag::Joinrise => "JOINRISE",
        }
    }

    /// Error tag reported in the status stream when this provider's fetch fails.
    pub fn fetch_error_tag(&self) -> &'static str {
        match self {
            ProviderTag::Remotive => "fetchRemotiveError",
            ProviderTag::RemoteOk => "fetchRemoteOkError",
            ProviderTag::Adzuna => "fetchAdzunaError",
            ProviderTag::Joinrise => "fetchJoinriseError",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExperienceLevel {
    Intern,
    Junior,
    #[default]
    Mid,
    Senior,
    Unknown,
}

impl ExperienceLevel {
    /// Parses a backend or provider label. Anything unrecognised is treated as mid-level;
    /// `Unknown` is only produced when the label literally says so.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "intern" | "internship" => ExperienceLevel::Intern,
            "junior" | "entry" | "entry level" => ExperienceLevel::Junior,
            "senior" | "lead" => ExperienceLevel::Senior,
            "unknown" => ExperienceLevel::Unknown,
            _ => ExperienceLevel::Mid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Intern => "INTERN",
            ExperienceLevel::Junior => "JUNIOR",
            ExperienceLevel::Mid => "MID",
            ExperienceLevel::Senior => "SENIOR",
            ExperienceLevel::Unknown => "UNKNOWN",
        }
    }
}

/// A posting as mapped from a provider response, before enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPosting {
    pub provider: ProviderTag,
    pub native_id: String,
    pub title: String,
    pub company_name: Option<String>,
    pub company_logo: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub job_type: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub candidate_required_location: Option<String>,
    pub salary: Option<String>,
    pub description: String,
    /// Seniority some providers publish up front; fed to the analyzer as a hint.
    pub level_hint: Option<ExperienceLevel>,
}

impl JobPosting {
    /// Minimal posting; adapters fill the optional fields they know about.
    pub fn new(provider: ProviderTag, native_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            provider,
            native_id: native_id.into(),
            title: title.into(),
            company_name: None,
            company_logo: None,
            url: None,
            category: None,
            job_type: None,
            publication_date: None,
            candidate_required_location: None,
            salary: None,
            description: String::new(),
            level_hint: None,
        }
    }

    pub fn natural_key(&self) -> String {
        format!("{}:{}", self.provider.as_str(), self.native_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillLevel {
    pub name: String,
    pub level: u32,
    /// Resolved taxonomy group; `None` until classification has run.
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedJob {
    pub posting: JobPosting,
    pub experience_level: ExperienceLevel,
    pub skills: Vec<SkillLevel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillGroup {
    pub skill: String,
    pub group: String,
}

impl SkillGroup {
    pub fn new(skill: &str, group: &str) -> Self {
        Self {
            skill: skill.trim().to_lowercase(),
            group: group.trim().to_string(),
        }
    }
}
