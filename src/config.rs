use crate::error::{AppError, Result};

pub const MARKETPLACE_URL: &str = "https://www.vinted.fr";

/// Internal catalog search endpoint, relative to the marketplace root.
pub const CATALOG_SEARCH_PATH: &str = "/api/v2/catalog/items";

/// Marketplace brand id for LEGO. Scopes the search so loose text matches
/// from other brands are never returned.
pub const LEGO_BRAND_ID: &str = "89162";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Stored in place of a missing listing photo.
pub const IMAGE_PLACEHOLDER: &str = "no-image";

pub const MS_PER_DAY: f64 = 86_400_000.0;

/// Ranks reported by the indicators panel.
pub mod percentile_ranks {
    pub const P5: f64 = 5.0;
    pub const P25: f64 = 25.0;
    pub const P50: f64 = 50.0;
}

/// Default page size for `/sales/search`.
pub const DEFAULT_SEARCH_LIMIT: i64 = 12;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub marketplace_url: String,
    /// Where the session cookie bundle is cached (COOKIE_CACHE_PATH).
    pub cookie_cache_path: String,
    /// Per-request timeout for every marketplace call (HTTP_TIMEOUT_SECS).
    pub http_timeout_secs: u64,
    /// Upstream brand filter (BRAND_ID). `None` means the search is not
    /// brand-scoped and items are filtered on `brand_title` instead.
    pub brand_id: Option<String>,
    /// Brand title items must declare when the search is not brand-scoped (BRAND_TITLE).
    pub brand_title: String,
    /// Condition filter passed upstream (STATUS_IDS), e.g. `1` = new with tags.
    pub status_ids: String,
    pub per_page: u32,
    /// Value of the marketplace locale header (LOCALE).
    pub locale: String,
    /// Max product ids scraped in parallel by `scanner scrape` (SCRAPE_CONCURRENCY).
    pub scrape_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "sales.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8092".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            marketplace_url: std::env::var("MARKETPLACE_URL")
                .unwrap_or_else(|_| MARKETPLACE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            cookie_cache_path: std::env::var("COOKIE_CACHE_PATH")
                .unwrap_or_else(|_| "cookies.json".to_string()),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| {
                    AppError::Config("HTTP_TIMEOUT_SECS must be a positive integer".to_string())
                })?,
            brand_id: match std::env::var("BRAND_ID") {
                Ok(v) if v.trim().is_empty() => None,
                Ok(v) => Some(v.trim().to_string()),
                Err(_) => Some(LEGO_BRAND_ID.to_string()),
            },
            brand_title: std::env::var("BRAND_TITLE").unwrap_or_else(|_| "lego".to_string()),
            status_ids: std::env::var("STATUS_IDS").unwrap_or_else(|_| "1".to_string()),
            per_page: std::env::var("PER_PAGE")
                .unwrap_or_else(|_| "96".to_string())
                .parse::<u32>()
                .unwrap_or(96),
            locale: std::env::var("LOCALE").unwrap_or_else(|_| "fr_FR".to_string()),
            scrape_concurrency: std::env::var("SCRAPE_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse::<usize>()
                .unwrap_or(4)
                .max(1),
        })
    }

    /// `fr_FR` → `fr-FR`, for Accept-Language.
    pub fn accept_language(&self) -> String {
        self.locale.replace('_', "-")
    }
}

#[cfg(test)]
impl Config {
    /// Defaults without touching the process environment.
    pub fn for_tests(marketplace_url: &str) -> Self {
        Self {
            log_level: "debug".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            marketplace_url: marketplace_url.to_string(),
            cookie_cache_path: "cookies.json".to_string(),
            http_timeout_secs: 5,
            brand_id: Some(LEGO_BRAND_ID.to_string()),
            brand_title: "lego".to_string(),
            status_ids: "1".to_string(),
            per_page: 96,
            locale: "fr_FR".to_string(),
            scrape_concurrency: 2,
        }
    }
}
