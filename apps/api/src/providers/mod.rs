//! Job board adapters.
//!
//! Every board maps its own response schema into [`JobPosting`]. The set of boards is
//! closed: [`Provider`] has one variant per [`ProviderTag`].

pub mod adzuna;
pub mod joinrise;
pub mod remote_ok;
pub mod remotive;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use thiserror::Error;

use crate::models::job::{JobPosting, ProviderTag};

pub use adzuna::AdzunaClient;
pub use joinrise::JoinriseClient;
pub use remote_ok::RemoteOkClient;
pub use remotive::RemotiveClient;

/// Batch size used for an unfiltered baseline fetch.
pub const DEFAULT_BATCH: u32 = 50;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Uniform fetch capability. "No results" is `Ok(vec![])`; errors mean the board could
/// not be reached or answered with something unreadable.
#[async_trait]
pub trait JobSource: Send + Sync {
    fn tag(&self) -> ProviderTag;

    async fn fetch_page(
        &self,
        query: &str,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<JobPosting>, ProviderError>;

    async fn fetch_first(&self, query: &str, page_size: u32) -> Result<Vec<JobPosting>, ProviderError> {
        self.fetch_page(query, page_size, 1).await
    }

    async fn fetch_default(&self) -> Result<Vec<JobPosting>, ProviderError> {
        self.fetch_page("", DEFAULT_BATCH, 1).await
    }
}

pub enum Provider {
    Remotive(RemotiveClient),
    RemoteOk(RemoteOkClient),
    Adzuna(AdzunaClient),
    Joinrise(JoinriseClient),
}

#[async_trait]
impl JobSource for Provider {
    fn tag(&self) -> ProviderTag {
        match self {
            Provider::Remotive(_) => ProviderTag::Remotive,
            Provider::RemoteOk(_) => ProviderTag::RemoteOk,
            Provider::Adzuna(_) => ProviderTag::Adzuna,
            Provider::Joinrise(_) => ProviderTag::Joinrise,
        }
    }

    async fn fetch_page(
        &self,
        query: &str,
        page_size: u32,
        page: u32,
    ) -> Result<Vec<JobPosting>, ProviderError> {
        match self {
            Provider::Remotive(c) => c.fetch_page(query, page_size, page).await,
            Provider::RemoteOk(c) => c.fetch_page(query, page_size, page).await,
            Provider::Adzuna(c) => c.fetch_page(query, page_size, page).await,
            Provider::Joinrise(c) => c.fetch_page(query, page_size, page).await,
        }
    }
}

/// Shared HTTP client for all boards. Some boards reject requests without a user agent.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("offerlens/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Sends a GET and decodes the body, mapping non-2xx into [`ProviderError::Status`].
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }

    Ok(serde_json::from_str(&body)?)
}

/// Accepts the date shapes the boards publish: RFC 3339, naive ISO datetime, or a bare date.
pub fn parse_publication_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Empty strings from upstream become `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
