use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER, USER_AGENT};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::config::{Config, CATALOG_SEARCH_PATH, IMAGE_PLACEHOLDER, USER_AGENT as BROWSER_USER_AGENT};
use crate::error::{AppError, Result};
use crate::extractor::{extract_product_id, is_valid_product_id};
use crate::session::CookieSet;
use crate::types::{FetchStats, Price, SaleRecord, Seller};

/// Header the marketplace reads the UI locale from.
const LOCALE_HEADER: &str = "X-Vinted-Locale";

/// Normalized result of one search call.
#[derive(Debug, Clone, Default)]
pub struct Listings {
    pub records: Vec<SaleRecord>,
    pub stats: FetchStats,
}

/// Anything that can run a marketplace search with a given cookie bundle.
pub trait ListingSource: Send + Sync {
    fn fetch_listings(
        &self,
        query: &str,
        cookies: &CookieSet,
    ) -> impl Future<Output = Result<Listings>> + Send;
}

/// Search filters that do not change between calls.
#[derive(Debug, Clone)]
pub struct SearchScope {
    /// `brand_ids[]` sent upstream. When unset the search is loose text and
    /// items are filtered on their declared brand instead.
    pub brand_id: Option<String>,
    pub brand_title: String,
    pub status_ids: String,
    pub per_page: u32,
}

impl SearchScope {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            brand_id: cfg.brand_id.clone(),
            brand_title: cfg.brand_title.clone(),
            status_ids: cfg.status_ids.clone(),
            per_page: cfg.per_page,
        }
    }

    fn is_brand_scoped(&self) -> bool {
        self.brand_id.is_some()
    }
}

pub struct MarketplaceClient {
    client: reqwest::Client,
    base_url: String,
    locale: String,
    accept_language: String,
    scope: SearchScope,
}

impl MarketplaceClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.marketplace_url.clone(),
            locale: cfg.locale.clone(),
            accept_language: cfg.accept_language(),
            scope: SearchScope::from_config(cfg),
        })
    }

    /// First page of newest listings for `query`, with the configured filters.
    pub fn search_request(&self, query: &str, cookies: &CookieSet) -> reqwest::RequestBuilder {
        let mut params: Vec<(&str, String)> = vec![
            ("page", "1".to_string()),
            ("per_page", self.scope.per_page.to_string()),
            ("search_text", query.to_string()),
        ];
        if let Some(brand_id) = &self.scope.brand_id {
            params.push(("brand_ids[]", brand_id.clone()));
        }
        if !self.scope.status_ids.is_empty() {
            params.push(("status_ids[]", self.scope.status_ids.clone()));
        }
        params.push(("order", "newest_first".to_string()));

        self.client
            .get(format!("{}{}", self.base_url, CATALOG_SEARCH_PATH))
            .query(&params)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .header(REFERER, format!("{}/", self.base_url))
            .header(LOCALE_HEADER, &self.locale)
            .header(COOKIE, cookies.to_header())
    }

    /// Runs one search. 401/403 is [`AppError::AuthExpired`], any other
    /// non-2xx is [`AppError::Fetch`], an unreadable body is [`AppError::Parse`].
    pub async fn fetch(&self, query: &str, cookies: &CookieSet) -> Result<Listings> {
        let resp = self
            .search_request(query, cookies)
            .send()
            .await
            .map_err(AppError::from_transport)?;

        let status = resp.status();
        check_status(status)?;

        let body = resp.text().await.map_err(AppError::from_transport)?;
        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AppError::Parse(format!("search response is not JSON: {e}")))?;

        let listings = parse_catalog_response(&json, &self.scope, &self.base_url)?;
        let s = &listings.stats;
        info!(
            query,
            kept = s.kept,
            api_total = s.api_total,
            "[FETCH] {query}: kept {} of {} | rejected: brand={} price={} malformed={} | duplicates={} | undated={}",
            s.kept, s.api_total, s.rejected_brand, s.rejected_price, s.rejected_malformed,
            s.duplicates, s.missing_published_at,
        );
        Ok(listings)
    }
}

impl ListingSource for MarketplaceClient {
    async fn fetch_listings(&self, query: &str, cookies: &CookieSet) -> Result<Listings> {
        self.fetch(query, cookies).await
    }
}

fn check_status(status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    match status.as_u16() {
        code @ (401 | 403) => {
            warn!("[FETCH] session rejected with HTTP {code}");
            Err(AppError::AuthExpired { status: code })
        }
        code => Err(AppError::Fetch { status: Some(code) }),
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

enum Rejection {
    Malformed,
    Brand,
    Price,
}

/// Normalizes a `{"items": [...]}` payload. Upstream order is preserved and
/// only the first occurrence of each listing id is kept.
pub fn parse_catalog_response(
    v: &serde_json::Value,
    scope: &SearchScope,
    base_url: &str,
) -> Result<Listings> {
    let items = v
        .get("items")
        .and_then(|i| i.as_array())
        .ok_or_else(|| AppError::Parse("search response has no `items` array".to_string()))?;

    let mut out = Listings::default();
    out.stats.api_total = items.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());

    for item in items {
        match parse_item(item, scope, base_url) {
            Ok(record) => {
                if !seen.insert(record.external_id.clone()) {
                    out.stats.duplicates += 1;
                    continue;
                }
                if record.published_at.is_none() {
                    out.stats.missing_published_at += 1;
                }
                out.records.push(record);
            }
            Err(Rejection::Malformed) => out.stats.rejected_malformed += 1,
            Err(Rejection::Brand) => out.stats.rejected_brand += 1,
            Err(Rejection::Price) => out.stats.rejected_price += 1,
        }
    }

    out.stats.kept = out.records.len();
    Ok(out)
}

fn parse_item(
    v: &serde_json::Value,
    scope: &SearchScope,
    base_url: &str,
) -> std::result::Result<SaleRecord, Rejection> {
    let external_id = match v.get("id") {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(Rejection::Malformed),
    };
    let title = v
        .get("title")
        .and_then(|t| t.as_str())
        .ok_or(Rejection::Malformed)?
        .to_string();

    if !scope.is_brand_scoped() {
        let brand = v.get("brand_title").and_then(|b| b.as_str()).unwrap_or("");
        if !brand.trim().eq_ignore_ascii_case(&scope.brand_title) {
            return Err(Rejection::Brand);
        }
    }

    let price = parse_price(v).ok_or(Rejection::Price)?;

    let product_id = ["id_lego", "product_id"]
        .iter()
        .filter_map(|k| v.get(*k).and_then(json_str_or_number))
        .find(|id| is_valid_product_id(id))
        .or_else(|| extract_product_id(&title));

    let user = v.get("user");
    let seller = Seller {
        username: user
            .and_then(|u| u.get("login"))
            .and_then(|l| l.as_str())
            .unwrap_or("")
            .to_string(),
        profile_url: user
            .and_then(|u| u.get("profile_url"))
            .and_then(|p| p.as_str())
            .unwrap_or("")
            .to_string(),
    };

    let link = v
        .get("url")
        .and_then(|u| u.as_str())
        .map(|s| s.to_string())
        .or_else(|| {
            v.get("path")
                .and_then(|p| p.as_str())
                .map(|p| format!("{base_url}{p}"))
        })
        .unwrap_or_else(|| format!("{base_url}/items/{external_id}"));

    let image = v
        .get("photo")
        .and_then(|p| p.get("url"))
        .and_then(|u| u.as_str())
        .filter(|u| !u.is_empty())
        .unwrap_or(IMAGE_PLACEHOLDER)
        .to_string();

    Ok(SaleRecord {
        external_id,
        title,
        price,
        product_id,
        published_at: parse_published_at(v),
        seller,
        link,
        image,
        favorites_count: json_count(v, "favourite_count"),
        views_count: json_count(v, "view_count"),
    })
}

/// Accepts `{"price": {"amount": "12.5", "currency_code": "EUR"}}` and the
/// older flat `{"price": "12.5", "currency": "EUR"}` shape.
fn parse_price(v: &serde_json::Value) -> Option<Price> {
    let raw = v.get("price")?;
    let (amount, currency) = match raw {
        serde_json::Value::Object(_) => (
            raw.get("amount").and_then(json_f64)?,
            raw.get("currency_code").and_then(|c| c.as_str()),
        ),
        other => (
            json_f64(other)?,
            v.get("currency").and_then(|c| c.as_str()),
        ),
    };
    Price::from_amount(amount, currency.unwrap_or("EUR"))
}

/// Listing publication time: the high-resolution photo timestamp (unix seconds)
/// when present, else an RFC 3339 `created_at_ts`. `None` when neither parses.
fn parse_published_at(v: &serde_json::Value) -> Option<DateTime<Utc>> {
    let photo_ts = v
        .get("photo")
        .and_then(|p| p.get("high_resolution"))
        .and_then(|h| h.get("timestamp"))
        .and_then(|t| t.as_i64());
    if let Some(secs) = photo_ts {
        if let Some(dt) = Utc.timestamp_opt(secs, 0).single() {
            return Some(dt);
        }
    }

    let iso = v.get("created_at_ts").and_then(|t| t.as_str())?;
    match DateTime::parse_from_rfc3339(iso) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            debug!("[FETCH] unparseable created_at_ts {iso:?}: {e}");
            None
        }
    }
}

fn json_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn json_str_or_number(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_count(v: &serde_json::Value, key: &str) -> u32 {
    v.get(key)
        .and_then(|c| c.as_u64())
        .map(|c| c.min(u64::from(u32::MAX)) as u32)
        .unwrap_or(0)
}
