use reqwest::Client;
use serde::Deserialize;

use super::{get_json, non_blank, parse_publication_date, ProviderError};
use crate::ingest::text::matches_query;
use crate::models::job::{ExperienceLevel, JobPosting, ProviderTag};

const JOINRISE_URL: &str = "https://api.joinrise.io";

#[derive(Debug, Deserialize)]
struct JoinriseResponse {
    result: Option<JoinriseResult>,
}

#[derive(Debug, Deserialize)]
struct JoinriseResult {
    #[serde(default)]
    jobs: Vec<RiseJob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RiseJob {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    title: String,
    seniority: Option<String>,
    salary_range_min_yearly: Option<u64>,
    salary_range_max_yearly: Option<u64>,
    url: Option<String>,
    #[serde(rename = "type")]
    job_type: Option<String>,
    created_at: Option<String>,
    location_address: Option<String>,
    category: Option<String>,
    owner: Option<RiseOwner>,
    description_breakdown: Option<DescriptionBreakdown>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RiseOwner {
    company_name: Option<String>,
    photo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionBreakdown {
    one_sentence_job_summary: Option<String>,
    #[serde(default)]
    skill_requirements: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Joinrise has no search parameter, so pages are filtered locally after fetching.
pub struct JoinriseClient {
    client: Client,
    base_url: String,
}

impl JoinriseClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, JOINRISE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_page(
        &self,
        query: &str,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<JobPosting>, ProviderError> {
        let response: JoinriseResponse = get_json(
            self.client
                .get(format!("{}/api/v1/jobs/public", self.base_url))
                .query(&[
                    ("limit", page_size.to_string()),
                    ("page", page.max(1).to_string()),
                    ("sortedBy", "createdAt".to_string()),
                    ("sort", "desc".to_string()),
                ]),
        )
        .await?;

        let jobs = response.result.map(|r| r.jobs).unwrap_or_default();
        Ok(jobs
            .into_iter()
            .filter(|job| {
                let keywords = job
                    .description_breakdown
                    .iter()
                    .flat_map(|d| d.keywords.iter().map(String::as_str));
                let fields = [
                    job.title.as_str(),
                    job.category.as_deref().unwrap_or_default(),
                    job.owner
                        .as_ref()
                        .and_then(|o| o.company_name.as_deref())
                        .unwrap_or_default(),
                ]
                .into_iter()
                .chain(keywords);
                matches_query(query, fields)
            })
            .map(into_posting)
            .collect())
    }
}

fn into_posting(job: RiseJob) -> JobPosting {
    let mut posting = JobPosting::new(ProviderTag::Joinrise, job.id, job.title.trim());
    posting.level_hint = job
        .seniority
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(ExperienceLevel::from_label);
    posting.url = non_blank(job.url);
    posting.category = non_blank(job.category);
    posting.job_type = non_blank(job.job_type);
    posting.publication_date = job.created_at.as_deref().and_then(parse_publication_date);
    posting.candidate_required_location = non_blank(job.location_address);
    if let Some(owner) = job.owner {
        posting.company_name = non_blank(owner.company_name);
        posting.company_logo = non_blank(owner.photo);
    }
    posting.salary = monthly_salary(job.salary_range_min_yearly, job.salary_range_max_yearly);

    // The board publishes no full description; the summary and skill list stand in for it.
    let breakdown = job.description_breakdown.unwrap_or_default();
    let mut description = breakdown.one_sentence_job_summary.unwrap_or_default();
    if !breakdown.skill_requirements.is_empty() {
        if !description.is_empty() {
            description.push(' ');
        }
        description.push_str(&breakdown.skill_requirements.join(" "));
    }
    posting.description = description;
    posting
}

fn monthly_salary(min_yearly: Option<u64>, max_yearly: Option<u64>) -> Option<String> {
    match (min_yearly.filter(|v| *v > 0), max_yearly.filter(|v| *v > 0)) {
        (Some(min), Some(max)) => Some(format!("{} - {}", min / 12, max / 12)),
        (Some(only), None) | (None, Some(only)) => Some(format!("{}", only / 12)),
        (None, None) => None,
    }
}
