use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::job::EnrichedJob;

/// Stored when a location string cannot be mapped to a country.
pub const UNMAPPED_COUNTRY: &str = "UNK";

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

static RE_TIMEZONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(CET|GMT|UTC|HOURS|ZONE)\b").expect("valid timezone regex"));

/// Maps a free-text location to a country code. `None` means "could not map".
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve(&self, raw: &str) -> Option<String>;
}

/// Keeps the provider's string as-is.
pub struct PassthroughResolver;

#[async_trait]
impl LocationResolver for PassthroughResolver {
    async fn resolve(&self, raw: &str) -> Option<String> {
        Some(raw.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    country_code: Option<String>,
}

/// Geocodes through Nominatim and caches answers (genuine misses included) for a day.
/// Failed lookups are not cached.
pub struct NominatimResolver {
    client: Client,
    base_url: String,
    cache: Mutex<HashMap<String, (Instant, Option<String>)>>,
}

impl NominatimResolver {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        Self::with_base_url(NOMINATIM_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("offerlens/", env!("CARGO_PKG_VERSION")))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// `Ok(None)` is a genuine "no match"; errors are transport or upstream failures.
    async fn lookup(&self, query: &str) -> reqwest::Result<Option<String>> {
        let places: Vec<NominatimPlace> = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("format", "json"),
                ("addressdetails", "1"),
                ("limit", "1"),
                ("q", query),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(places
            .into_iter()
            .next()
            .and_then(|p| p.address)
            .and_then(|a| a.country_code)
            .and_then(|alpha2| alpha2_to_alpha3(&alpha2))
            .map(str::to_string))
    }
}

#[async_trait]
impl LocationResolver for NominatimResolver {
    async fn resolve(&self, raw: &str) -> Option<String> {
        let key = raw.trim().to_lowercase();
        if key.is_empty() || RE_TIMEZONE.is_match(&key) {
            return None;
        }

        if let Some((at, code)) = self.cache.lock().await.get(&key) {
            if at.elapsed() < CACHE_TTL {
                return code.clone();
            }
        }

        match self.lookup(&key).await {
            Ok(code) => {
                debug!(location = %key, code = ?code, "Resolved location");
                self.cache
                    .lock()
                    .await
                    .insert(key, (Instant::now(), code.clone()));
                code
            }
            // Not cached: the next posting with this location asks again.
            Err(e) => {
                warn!(location = %key, "Nominatim lookup failed: {e}");
                None
            }
        }
    }
}

/// Rewrites each record's location into a country code. Blank locations stay empty and
/// are bucketed as unspecified downstream; anything unmappable becomes `UNK`.
pub async fn normalize_locations(jobs: &mut [EnrichedJob], resolver: &dyn LocationResolver) {
    for job in jobs.iter_mut() {
        let location = &mut job.posting.candidate_required_location;
        let Some(raw) = location.as_deref().map(str::trim).filter(|l| !l.is_empty()) else {
            *location = None;
            continue;
        };
        let code = resolver
            .resolve(raw)
            .await
            .unwrap_or_else(|| UNMAPPED_COUNTRY.to_string());
        *location = Some(code);
    }
}

fn alpha2_to_alpha3(alpha2: &str) -> Option<&'static str> {
    let upper = alpha2.trim().to_uppercase();
    COUNTRY_CODES
        .iter()
        .find(|(a2, _)| *a2 == upper)
        .map(|(_, a3)| *a3)
}

const COUNTRY_CODES: &[(&str, &str)] = &[
    ("AD", "AND"), ("AE", "ARE"), ("AF", "AFG"), ("AG", "ATG"), ("AL", "ALB"), ("AM", "ARM"),
    ("AO", "AGO"), ("AR", "ARG"), ("AT", "AUT"), ("AU", "AUS"), ("AZ", "AZE"), ("BA", "BIH"),
    ("BB", "BRB"), ("BD", "BGD"), ("BE", "BEL"), ("BF", "BFA"), ("BG", "BGR"), ("BH", "BHR"),
    ("BI", "BDI"), ("BJ", "BEN"), ("BN", "BRN"), ("BO", "BOL"), ("BR", "BRA"), ("BS", "BHS"),
    ("BT", "BTN"), ("BW", "BWA"), ("BY", "BLR"), ("BZ", "BLZ"), ("CA", "CAN"), ("CD", "COD"),
    ("CF", "CAF"), ("CG", "COG"), ("CH", "CHE"), ("CI", "CIV"), ("CL", "CHL"), ("CM", "CMR"),
    ("CN", "CHN"), ("CO", "COL"), ("CR", "CRI"), ("CU", "CUB"), ("CV", "CPV"), ("CY", "CYP"),
    ("CZ", "CZE"), ("DE", "DEU"), ("DJ", "DJI"), ("DK", "DNK"), ("DM", "DMA"), ("DO", "DOM"),
    ("DZ", "DZA"), ("EC", "ECU"), ("EE", "EST"), ("EG", "EGY"), ("ER", "ERI"), ("ES", "ESP"),
    ("ET", "ETH"), ("FI", "FIN"), ("FJ", "FJI"), ("FR", "FRA"), ("GA", "GAB"), ("GB", "GBR"),
    ("GD", "GRD"), ("GE", "GEO"), ("GH", "GHA"), ("GM", "GMB"), ("GN", "GIN"), ("GQ", "GNQ"),
    ("GR", "GRC"), ("GT", "GTM"), ("GW", "GNB"), ("GY", "GUY"), ("HK", "HKG"), ("HN", "HND"),
    ("HR", "HRV"), ("HT", "HTI"), ("HU", "HUN"), ("ID", "IDN"), ("IE", "IRL"), ("IL", "ISR"),
    ("IN", "IND"), ("IQ", "IRQ"), ("IR", "IRN"), ("IS", "ISL"), ("IT", "ITA"), ("JM", "JAM"),
    ("JO", "JOR"), ("JP", "JPN"), ("KE", "KEN"), ("KG", "KGZ"), ("KH", "KHM"), ("KM", "COM"),
    ("KN", "KNA"), ("KP", "PRK"), ("KR", "KOR"), ("KW", "KWT"), ("KZ", "KAZ"), ("LA", "LAO"),
    ("LB", "LBN"), ("LC", "LCA"), ("LI", "LIE"), ("LK", "LKA"), ("LR", "LBR"), ("LS", "LSO"),
    ("LT", "LTU"), ("LU", "LUX"), ("LV", "LVA"), ("LY", "LBY"), ("MA", "MAR"), ("MC", "MCO"),
    ("MD", "MDA"), ("ME", "MNE"), ("MG", "MDG"), ("MK", "MKD"), ("ML", "MLI"), ("MM", "MMR"),
    ("MN", "MNG"), ("MR", "MRT"), ("MT", "MLT"), ("MU", "MUS"), ("MV", "MDV"), ("MW", "MWI"),
    ("MX", "MEX"), ("MY", "MYS"), ("MZ", "MOZ"), ("NA", "NAM"), ("NE", "NER"), ("NG", "NGA"),
    ("NI", "NIC"), ("NL", "NLD"), ("NO", "NOR"), ("NP", "NPL"), ("NZ", "NZL"), ("OM", "OMN"),
    ("PA", "PAN"), ("PE", "PER"), ("PG", "PNG"), ("PH", "PHL"), ("PK", "PAK"), ("PL", "POL"),
    ("PR", "PRI"), ("PS", "PSE"), ("PT", "PRT"), ("PY", "PRY"), ("QA", "QAT"), ("RO", "ROU"),
    ("RS", "SRB"), ("RU", "RUS"), ("RW", "RWA"), ("SA", "SAU"), ("SC", "SYC"), ("SD", "SDN"),
    ("SE", "SWE"), ("SG", "SGP"), ("SI", "SVN"), ("SK", "SVK"), ("SL", "SLE"), ("SM", "SMR"),
    ("SN", "SEN"), ("SO", "SOM"), ("SR", "SUR"), ("SS", "SSD"), ("SV", "SLV"), ("SY", "SYR"),
    ("SZ", "SWZ"), ("TD", "TCD"), ("TG", "TGO"), ("TH", "THA"), ("TJ", "TJK"), ("TL", "TLS"),
    ("TM", "TKM"), ("TN", "TUN"), ("TR", "TUR"), ("TT", "TTO"), ("TW", "TWN"), ("TZ", "TZA"),
    ("UA", "UKR"), ("UG", "UGA"), ("US", "USA"), ("UY", "URY"), ("UZ", "UZB"), ("VE", "VEN"),
    ("VN", "VNM"), ("YE", "YEM"), ("ZA", "ZAF"), ("ZM", "ZMB"), ("ZW", "ZWE"),
];
