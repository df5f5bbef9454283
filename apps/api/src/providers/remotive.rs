use reqwest::Client;
use serde::Deserialize;

use super::{get_json, non_blank, parse_publication_date, ProviderError};
use crate::models::job::{JobPosting, ProviderTag};

const REMOTIVE_URL: &str = "https://remotive.com";

#[derive(Debug, Deserialize)]
struct RemotiveResponse {
    #[serde(default)]
    jobs: Vec<RemotiveJob>,
}

#[derive(Debug, Deserialize)]
struct RemotiveJob {
    id: i64,
    title: String,
    url: Option<String>,
    company_name: Option<String>,
    company_logo: Option<String>,
    category: Option<String>,
    job_type: Option<String>,
    publication_date: Option<String>,
    candidate_required_location: Option<String>,
    salary: Option<String>,
    #[serde(default)]
    description: String,
}

pub struct RemotiveClient {
    client: Client,
    base_url: String,
}

impl RemotiveClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, REMOTIVE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Remotive has no pagination: the first page is the whole answer.
    pub async fn fetch_page(
        &self,
        query: &str,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<JobPosting>, ProviderError> {
        if page > 1 {
            return Ok(Vec::new());
        }

        let mut params = vec![("limit", page_size.to_string())];
        if !query.trim().is_empty() {
            params.push(("search", query.trim().to_string()));
        }

        let response: RemotiveResponse = get_json(
            self.client
                .get(format!("{}/api/remote-jobs", self.base_url))
                .query(&params),
        )
        .await?;

        Ok(response.jobs.into_iter().map(into_posting).collect())
    }
}

fn into_posting(job: RemotiveJob) -> JobPosting {
    let mut posting = JobPosting::new(ProviderTag::Remotive, job.id.to_string(), job.title.trim());
    posting.url = non_blank(job.url);
    posting.company_name = non_blank(job.company_name);
    posting.company_logo = non_blank(job.company_logo);
    posting.category = non_blank(job.category);
    posting.job_type = non_blank(job.job_type);
    posting.publication_date = job.publication_date.as_deref().and_then(parse_publication_date);
    posting.candidate_required_location = non_blank(job.candidate_required_location);
    posting.salary = non_blank(job.salary);
    posting.description = job.description;
    posting
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_maps_remotive_jobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/remote-jobs"))
            .and(query_param("search", "rust"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job-count": 1,
                "jobs": [{
                    "id": 1911,
                    "url": "https://remotive.com/remote-jobs/software-dev/rust-1911",
                    "title": "Rust Developer",
                    "company_name": "Ferrous",
                    "company_logo": "",
                    "category": "Software Development",
                    "job_type": "full_time",
                    "publication_date": "2024-02-10T08:00:00",
                    "candidate_required_location": "Europe",
                    "salary": "",
                    "description": "<p>Write Rust</p>"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemotiveClient::with_base_url(Client::new(), &server.uri());
        let jobs = client.fetch_page("rust", 2, 1).await.unwrap();

        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.natural_key(), "REMOTIVE:1911");
        assert_eq!(job.company_name.as_deref(), Some("Ferrous"));
        assert_eq!(job.company_logo, None);
        assert_eq!(job.salary, None);
        assert_eq!(job.candidate_required_location.as_deref(), Some("Europe"));
        assert!(job.publication_date.is_some());
        assert_eq!(job.description, "<p>Write Rust</p>");
    }

    #[tokio::test]
    async fn test_second_page_is_empty_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobs": []})))
            .expect(0)
            .mount(&server)
            .await;

        let client = RemotiveClient::with_base_url(Client::new(), &server.uri());
        assert!(client.fetch_page("rust", 10, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = RemotiveClient::with_base_url(Client::new(), &server.uri());
        let err = client.fetch_page("rust", 10, 1).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 502, .. }));
    }
}
