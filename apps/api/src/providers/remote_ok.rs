use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{get_json, non_blank, parse_publication_date, ProviderError};
use crate::ingest::text::matches_query;
use crate::models::job::{JobPosting, ProviderTag};

const REMOTE_OK_URL: &str = "https://remoteok.com";

#[derive(Debug, Deserialize)]
struct RemoteOkJob {
    id: Value,
    slug: Option<String>,
    position: Option<String>,
    company: Option<String>,
    company_logo: Option<String>,
    url: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    location: Option<String>,
    salary_min: Option<u64>,
    salary_max: Option<u64>,
    #[serde(default)]
    description: String,
    date: Option<String>,
}

impl RemoteOkJob {
    fn native_id(&self) -> Option<String> {
        match &self.id {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn title(&self) -> &str {
        self.position
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .or(self.slug.as_deref())
            .unwrap_or_default()
    }
}

/// RemoteOK serves its entire board in one response; search and paging happen locally.
pub struct RemoteOkClient {
    client: Client,
    base_url: String,
}

impl RemoteOkClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, REMOTE_OK_URL)
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
        let entries: Vec<Value> =
            get_json(self.client.get(format!("{}/api", self.base_url))).await?;

        // The first element is a legal notice, not a job; anything else without an id
        // is skipped the same way.
        let jobs = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<RemoteOkJob>(entry).ok())
            .filter(|job| job.native_id().is_some())
            .filter(|job| {
                let fields = [job.title(), job.description.as_str()]
                    .into_iter()
                    .chain(job.tags.iter().map(String::as_str));
                matches_query(query, fields)
            });

        let skip = page.saturating_sub(1) as usize * page_size as usize;
        let postings: Vec<JobPosting> = jobs
            .skip(skip)
            .take(page_size as usize)
            .filter_map(into_posting)
            .collect();

        debug!(count = postings.len(), page, "RemoteOK page sliced");
        Ok(postings)
    }
}

fn into_posting(job: RemoteOkJob) -> Option<JobPosting> {
    let id = job.native_id()?;
    let mut posting = JobPosting::new(ProviderTag::RemoteOk, id, job.title().trim());
    posting.company_name = non_blank(job.company);
    posting.company_logo = non_blank(job.company_logo);
    posting.url = non_blank(job.url);
    posting.candidate_required_location = non_blank(job.location);
    posting.publication_date = job.date.as_deref().and_then(parse_publication_date);
    posting.salary = match (job.salary_min, job.salary_max) {
        (Some(min), Some(max)) if min > 0 || max > 0 => Some(format!("{min}-{max}")),
        _ => None,
    };
    if !job.tags.is_empty() {
        posting.category = Some(job.tags.join(", "));
    }
    posting.description = job.description;
    Some(posting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn board() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"legal": "API terms of service"},
                {"id": "101", "position": "Rust Engineer", "company": "Oxide",
                 "tags": ["rust", "backend"], "location": "Worldwide",
                 "salary_min": 90000, "salary_max": 120000, "description": "systems",
                 "date": "2024-05-01T12:00:00+00:00"},
                {"id": 102, "position": "Go Engineer", "tags": ["golang"], "description": "rust-adjacent"},
                {"id": "103", "position": "Designer", "tags": ["figma"], "description": "ui"},
                {"id": "104", "slug": "senior-rust-dev", "position": "", "tags": ["rust"],
                 "salary_min": 0, "salary_max": 0}
            ])))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_filters_by_query_tokens() {
        let server = board().await;
        let client = RemoteOkClient::with_base_url(Client::new(), &server.uri());

        let jobs = client.fetch_page("rust", 10, 1).await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.native_id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102", "104"]);
    }

    #[tokio::test]
    async fn test_maps_salary_tags_and_slug_title() {
        let server = board().await;
        let client = RemoteOkClient::with_base_url(Client::new(), &server.uri());

        let jobs = client.fetch_page("rust", 10, 1).await.unwrap();
        assert_eq!(jobs[0].salary.as_deref(), Some("90000-120000"));
        assert_eq!(jobs[0].category.as_deref(), Some("rust, backend"));
        assert_eq!(jobs[0].candidate_required_location.as_deref(), Some("Worldwide"));
        assert_eq!(jobs[2].title, "senior-rust-dev");
        assert_eq!(jobs[2].salary, None);
    }

    #[tokio::test]
    async fn test_pages_are_sliced_locally() {
        let server = board().await;
        let client = RemoteOkClient::with_base_url(Client::new(), &server.uri());

        let second = client.fetch_page("rust", 2, 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].native_id, "104");

        let third = client.fetch_page("rust", 2, 3).await.unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_returns_whole_board() {
        let server = board().await;
        let client = RemoteOkClient::with_base_url(Client::new(), &server.uri());

        assert_eq!(client.fetch_page("", 50, 1).await.unwrap().len(), 4);
    }
}
