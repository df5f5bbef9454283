use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Which location normalizer a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocationLookup {
    /// Keeps the provider's free-text location.
    #[default]
    Passthrough,
    /// Resolves free text to an ISO 3166-1 alpha-3 code through Nominatim.
    Nominatim,
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Optional second progress transport. Progress always reaches the SSE hub.
    pub redis_url: Option<String>,
    pub enrichment_url: String,
    pub enrichment_max_retries: u32,
    pub enrichment_retry_delay_ms: u64,
    pub enrichment_timeout_secs: u64,
    pub adzuna_app_id: Option<String>,
    pub adzuna_app_key: Option<String>,
    pub adzuna_country: String,
    pub provider_timeout_secs: u64,
    pub default_page_size: u32,
    pub ingest_max_pages: u32,
    pub location_lookup: LocationLookup,
    pub port: u16,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            redis_url: None,
            enrichment_url: "http://localhost:8000".to_string(),
            enrichment_max_retries: 5,
            enrichment_retry_delay_ms: 3000,
            enrichment_timeout_secs: 120,
            adzuna_app_id: None,
            adzuna_app_key: None,
            adzuna_country: "gb".to_string(),
            provider_timeout_secs: 30,
            default_page_size: 20,
            ingest_max_pages: 50,
            location_lookup: LocationLookup::default(),
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();
        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: optional_env("REDIS_URL"),
            enrichment_url: env_or("ENRICHMENT_URL", defaults.enrichment_url)?,
            enrichment_max_retries: env_or("ENRICHMENT_MAX_RETRIES", defaults.enrichment_max_retries)?,
            enrichment_retry_delay_ms: env_or(
                "ENRICHMENT_RETRY_DELAY_MS",
                defaults.enrichment_retry_delay_ms,
            )?,
            enrichment_timeout_secs: env_or("ENRICHMENT_TIMEOUT_SECS", defaults.enrichment_timeout_secs)?,
            adzuna_app_id: optional_env("ADZUNA_APP_ID"),
            adzuna_app_key: optional_env("ADZUNA_APP_KEY"),
            adzuna_country: env_or("ADZUNA_COUNTRY", defaults.adzuna_country)?,
            provider_timeout_secs: env_or("PROVIDER_TIMEOUT_SECS", defaults.provider_timeout_secs)?,
            default_page_size: env_or("DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            ingest_max_pages: env_or("INGEST_MAX_PAGES", defaults.ingest_max_pages)?,
            location_lookup: match optional_env("LOCATION_LOOKUP") {
                Some(raw) => parse_location_lookup(&raw)?,
                None => defaults.location_lookup,
            },
            port: env_or("PORT", defaults.port).context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", defaults.rust_log)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank both read as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn parse_location_lookup(raw: &str) -> Result<LocationLookup> {
    match raw.to_ascii_lowercase().as_str() {
        "passthrough" => Ok(LocationLookup::Passthrough),
        "nominatim" => Ok(LocationLookup::Nominatim),
        other => bail!("LOCATION_LOOKUP must be 'passthrough' or 'nominatim', got '{other}'"),
    }
}
