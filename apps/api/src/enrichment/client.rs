use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Analysis, Enricher, EnrichmentError};
use crate::models::job::ExperienceLevel;

/// Fixed-delay retry applied to every analyzer call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    seniority: Option<String>,
    #[serde(default)]
    skills: Option<HashMap<String, f64>>,
}

#[derive(Debug, Serialize)]
struct GroupSkillsRequest<'a> {
    skills: &'a [String],
}

#[derive(Debug, Deserialize)]
struct AnalyzerErrorBody {
    detail: String,
}

/// HTTP client for the analyzer service (`/analyze`, `/groupSkills`).
#[derive(Clone)]
pub struct AnalyzerClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl AnalyzerClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, EnrichmentError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// POSTs `body` and returns the raw response text.
    /// Transport errors, 429 and 5xx are retried after a fixed delay; other failures are final.
    async fn post(&self, path: &str, body: &impl Serialize) -> Result<String, EnrichmentError> {
        let url = format!("{}{path}", self.base_url);
        let mut last_error: Option<EnrichmentError> = None;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                warn!(
                    "Analyzer call to {path} failed (attempt {attempt}), retrying after {}ms...",
                    self.retry.delay.as_millis()
                );
                tokio::time::sleep(self.retry.delay).await;
            }

            let response = match self.client.post(&url).json(body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(EnrichmentError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Analyzer returned {status}: {body}");
                last_error = Some(EnrichmentError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnalyzerErrorBody>(&body)
                    .map(|e| e.detail)
                    .unwrap_or(body);
                return Err(EnrichmentError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response.text().await?);
        }

        Err(last_error.unwrap_or(EnrichmentError::RetriesExhausted {
            retries: self.retry.max_retries,
        }))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, EnrichmentError> {
        let text = self.post(path, body).await?;
        serde_json::from_str(&text).map_err(EnrichmentError::Parse)
    }
}

#[async_trait]
impl Enricher for AnalyzerClient {
    async fn analyze(&self, text: &str) -> Result<Analysis, EnrichmentError> {
        let response: AnalyzeResponse = self.post_json("/analyze", &AnalyzeRequest { text }).await?;

        let skills = response
            .skills
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, weight)| {
                let name = name.trim().to_string();
                let weight = weight.round();
                (!name.is_empty() && weight >= 1.0).then(|| (name, weight.min(u32::MAX as f64) as u32))
            })
            .collect::<HashMap<_, _>>();

        debug!(skills = skills.len(), "Analyzer returned posting analysis");

        Ok(Analysis {
            experience_level: response
                .seniority
                .as_deref()
                .map(ExperienceLevel::from_label)
                .unwrap_or_default(),
            skills,
        })
    }

    async fn classify(&self, skills: &[String]) -> Result<HashMap<String, String>, EnrichmentError> {
        let text = self.post("/groupSkills", &GroupSkillsRequest { skills }).await?;

        let groups: Option<HashMap<String, Option<String>>> = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text)?
        };

        let groups = groups
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(skill, group)| {
                let group = group?.trim().to_string();
                (!group.is_empty()).then(|| (skill.trim().to_lowercase(), group))
            })
            .collect::<HashMap<_, _>>();

        if groups.is_empty() {
            warn!(requested = skills.len(), "Analyzer returned no skill groups");
        }

        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, max_retries: u32) -> AnalyzerClient {
        AnalyzerClient::new(
            &server.uri(),
            Duration::from_secs(5),
            RetryPolicy {
                max_retries,
                delay: Duration::from_millis(1),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_parses_level_and_skills() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_json(json!({"text": "Rust Engineer"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "seniority": "senior",
                "skills": {"Rust": 5, "Docker": 2, "Excel": 0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = client(&server, 0).analyze("Rust Engineer").await.unwrap();
        assert_eq!(analysis.experience_level, ExperienceLevel::Senior);
        assert_eq!(analysis.skills.get("Rust"), Some(&5));
        assert_eq!(analysis.skills.get("Docker"), Some(&2));
        assert!(!analysis.skills.contains_key("Excel"), "zero weights are dropped");
    }

    #[tokio::test]
    async fn test_analyze_explicit_unknown_level() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "seniority": "unknown",
                "skills": {}
            })))
            .mount(&server)
            .await;

        let analysis = client(&server, 0).analyze("?").await.unwrap();
        assert_eq!(analysis.experience_level, ExperienceLevel::Unknown);
        assert!(analysis.skills.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "seniority": "junior",
                "skills": {"Go": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = client(&server, 3).analyze("Go dev").await.unwrap();
        assert_eq!(analysis.experience_level, ExperienceLevel::Junior);
        assert_eq!(analysis.skills.get("Go"), Some(&3));
    }

    #[tokio::test]
    async fn test_analyze_gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 2).analyze("text").await.unwrap_err();
        assert!(
            matches!(err, EnrichmentError::Api { status: 500, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"detail": "text missing"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 5).analyze("").await.unwrap_err();
        match err {
            EnrichmentError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "text missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        // Nothing listens on port 1.
        let client = AnalyzerClient::new(
            "http://127.0.0.1:1",
            Duration::from_secs(1),
            RetryPolicy {
                max_retries: 1,
                delay: Duration::from_millis(1),
            },
        )
        .unwrap();

        let err = client.analyze("text").await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Http(_)), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_classify_lowercases_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/groupSkills"))
            .and(body_json(json!({"skills": ["go", "kafka"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Go": "Backend",
                "kafka": "Messaging"
            })))
            .mount(&server)
            .await;

        let groups = client(&server, 0)
            .classify(&["go".to_string(), "kafka".to_string()])
            .await
            .unwrap();
        assert_eq!(groups.get("go").map(String::as_str), Some("Backend"));
        assert_eq!(groups.get("kafka").map(String::as_str), Some("Messaging"));
    }

    #[tokio::test]
    async fn test_classify_null_body_is_empty_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/groupSkills"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let groups = client(&server, 0).classify(&["zig".to_string()]).await.unwrap();
        assert!(groups.is_empty());
    }
}
