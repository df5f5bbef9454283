use reqwest::Client;
use serde::Deserialize;

use super::{get_json, non_blank, parse_publication_date, ProviderError};
use crate::models::job::{JobPosting, ProviderTag};

const ADZUNA_URL: &str = "https://api.adzuna.com";

#[derive(Debug, Deserialize)]
struct AdzunaResponse {
    #[serde(default)]
    results: Vec<AdzunaJob>,
}

#[derive(Debug, Deserialize)]
struct AdzunaJob {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    redirect_url: Option<String>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    contract_type: Option<String>,
    contract_time: Option<String>,
    created: Option<String>,
    company: Option<AdzunaCompany>,
    category: Option<AdzunaCategory>,
    location: Option<AdzunaLocation>,
}

#[derive(Debug, Deserialize)]
struct AdzunaCompany {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaCategory {
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaLocation {
    display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdzunaCredentials {
    pub app_id: String,
    pub app_key: String,
    pub country: String,
}

pub struct AdzunaClient {
    client: Client,
    base_url: String,
    credentials: AdzunaCredentials,
}

impl AdzunaClient {
    pub fn new(client: Client, credentials: AdzunaCredentials) -> Self {
        Self::with_base_url(client, ADZUNA_URL, credentials)
    }

    pub fn with_base_url(client: Client, base_url: &str, credentials: AdzunaCredentials) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub async fn fetch_page(
        &self,
        query: &str,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<JobPosting>, ProviderError> {
        let url = format!(
            "{}/v1/api/jobs/{}/search/{}",
            self.base_url,
            self.credentials.country,
            page.max(1)
        );

        let mut params = vec![
            ("app_id", self.credentials.app_id.clone()),
            ("app_key", self.credentials.app_key.clone()),
            ("results_per_page", page_size.to_string()),
            ("content-type", "application/json".to_string()),
        ];
        if !query.trim().is_empty() {
            params.push(("what", query.trim().to_string()));
        }

        let response: AdzunaResponse = get_json(self.client.get(url).query(&params)).await?;
        Ok(response.results.into_iter().map(into_posting).collect())
    }
}

fn into_posting(job: AdzunaJob) -> JobPosting {
    let mut posting = JobPosting::new(ProviderTag::Adzuna, job.id, job.title.trim());
    posting.company_name = non_blank(job.company.and_then(|c| c.display_name));
    posting.url = non_blank(job.redirect_url);
    posting.category = non_blank(job.category.and_then(|c| c.label));
    posting.job_type = non_blank(job.contract_type.or(job.contract_time));
    posting.publication_date = job.created.as_deref().and_then(parse_publication_date);
    posting.candidate_required_location = non_blank(job.location.and_then(|l| l.display_name));
    posting.salary = match (job.salary_min, job.salary_max) {
        (Some(min), Some(max)) if (min - max).abs() < f64::EPSILON => Some(format!("{min:.0}")),
        (Some(min), Some(max)) => Some(format!("{min:.0}-{max:.0}")),
        (Some(single), None) | (None, Some(single)) => Some(format!("{single:.0}")),
        (None, None) => None,
    };
    posting.description = job.description;
    posting
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> AdzunaCredentials {
        AdzunaCredentials {
            app_id: "id".to_string(),
            app_key: "key".to_string(),
            country: "gb".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_page_uses_path_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/api/jobs/gb/search/3"))
            .and(query_param("what", "data engineer"))
            .and(query_param("results_per_page", "5"))
            .and(query_param("app_id", "id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "results": [{
                    "id": "4471",
                    "title": "Data Engineer",
                    "description": "Pipelines &amp; lakes",
                    "redirect_url": "https://adzuna.example/4471",
                    "salary_min": 50000.0,
                    "salary_max": 65000.0,
                    "contract_type": "permanent",
                    "created": "2024-04-02T09:15:00Z",
                    "company": {"display_name": "Lakehouse Ltd"},
                    "category": {"label": "IT Jobs", "tag": "it-jobs"},
                    "location": {"display_name": "London, UK"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AdzunaClient::with_base_url(Client::new(), &server.uri(), credentials());
        let jobs = client.fetch_page("data engineer", 5, 3).await.unwrap();

        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.natural_key(), "ADZUNA:4471");
        assert_eq!(job.company_name.as_deref(), Some("Lakehouse Ltd"));
        assert_eq!(job.salary.as_deref(), Some("50000-65000"));
        assert_eq!(job.category.as_deref(), Some("IT Jobs"));
        assert_eq!(job.candidate_required_location.as_deref(), Some("London, UK"));
        assert_eq!(job.job_type.as_deref(), Some("permanent"));
    }

    #[tokio::test]
    async fn test_empty_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "results": []})))
            .mount(&server)
            .await;

        let client = AdzunaClient::with_base_url(Client::new(), &server.uri(), credentials());
        assert!(client.fetch_page("cobol", 5, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = AdzunaClient::with_base_url(Client::new(), &server.uri(), credentials());
        let err = client.fetch_page("rust", 5, 1).await.unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }
}
