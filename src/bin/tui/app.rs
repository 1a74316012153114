use chrono::{DateTime, Utc};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    pub cents: i64,
    pub currency_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct SellerResponse {
    pub username: String,
    pub profile_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct SaleResponse {
    pub external_id: String,
    pub title: String,
    pub price: PriceResponse,
    pub published_at: Option<DateTime<Utc>>,
    pub seller: SellerResponse,
    pub link: String,
    pub favorites_count: u32,
    pub views_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub results: Vec<SaleResponse>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct IndicatorsResponse {
    pub count: usize,
    pub average: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeResponse {
    pub observed_span_days: Option<i64>,
    pub span_to_present_days: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub currency: Option<String>,
    pub indicators: IndicatorsResponse,
    pub lifetime: LifetimeResponse,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub stored: usize,
    pub session_regenerated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

/// Sort keys accepted by `/sales/search`, in cycling order.
pub const SORTS: [&str; 6] = [
    "newest",
    "oldest",
    "price_asc",
    "price_desc",
    "most_favorited",
    "most_viewed",
];

pub const PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub base_url: String,
    pub product_id: String,
    pub page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub sort: usize,
    pub sales: Vec<SaleResponse>,
    pub selected: usize,
    pub report: ReportResponse,
    /// Outcome of the last scrape triggered with `f`.
    pub message: Option<String>,
}

impl AppState {
    pub fn new(base_url: String, product_id: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            base_url,
            product_id,
            page: 1,
            total: 0,
            total_pages: 0,
            sort: 0,
            sales: Vec::new(),
            selected: 0,
            report: ReportResponse::default(),
            message: None,
        }
    }

    pub fn sort_key(&self) -> &'static str {
        SORTS[self.sort % SORTS.len()]
    }

    pub fn search_url(&self) -> String {
        format!(
            "{}/sales/search?legoSetId={}&page={}&limit={}&sort={}",
            self.base_url,
            self.product_id,
            self.page,
            PAGE_SIZE,
            self.sort_key()
        )
    }

    pub fn indicators_url(&self) -> String {
        format!("{}/sales/{}/indicators", self.base_url, self.product_id)
    }

    pub fn fetch_url(&self) -> String {
        format!("{}/sales/fetch/{}", self.base_url, self.product_id)
    }

    /// Returns true if the page changed.
    pub fn next_page(&mut self) -> bool {
        if self.page < self.total_pages {
            self.page += 1;
            self.selected = 0;
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page > 1 {
            self.page -= 1;
            self.selected = 0;
            true
        } else {
            false
        }
    }

    /// Moves to the next sort key and back to the first page.
    pub fn cycle_sort(&mut self) {
        self.sort = (self.sort + 1) % SORTS.len();
        self.page = 1;
        self.selected = 0;
    }

    pub fn scroll_down(&mut self) {
        let max = self.sales.len().saturating_sub(1);
        self.selected = (self.selected + 1).min(max);
    }

    pub fn scroll_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn apply_search(&mut self, resp: SearchResponse) {
        self.page = resp.page;
        self.total = resp.total;
        self.total_pages = resp.total_pages;
        self.sales = resp.results;
        self.selected = self.selected.min(self.sales.len().saturating_sub(1));
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let search_url = self.search_url();
        let indicators_url = self.indicators_url();
        let (search_res, report_res) = tokio::join!(
            client.get(&search_url).send(),
            client.get(&indicators_url).send(),
        );

        let (search_resp, report_resp) = match (search_res, report_res) {
            (Ok(s), Ok(r)) => (s, r),
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        let (search, report) = tokio::join!(
            search_resp.json::<SearchResponse>(),
            report_resp.json::<ReportResponse>(),
        );

        match (search, report) {
            (Ok(s), Ok(r)) => {
                self.apply_search(s);
                self.report = r;
                self.status = ConnectionStatus::Connected;
            }
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
            }
        }
    }

    /// Asks the server to re-scrape the current set, then reloads.
    pub async fn trigger_scrape(&mut self, client: &reqwest::Client) {
        self.message = Some(format!("scraping {}…", self.product_id));
        let resp = match client.get(self.fetch_url()).send().await {
            Ok(r) => r,
            Err(e) => {
                self.message = Some(format!("scrape failed: {e}"));
                return;
            }
        };

        self.message = Some(if resp.status().is_success() {
            match resp.json::<ScrapeResponse>().await {
                Ok(s) => scrape_message(&s),
                Err(e) => format!("scrape failed: {e}"),
            }
        } else {
            let status = resp.status().as_u16();
            match resp.json::<ErrorResponse>().await {
                Ok(err) => format!("scrape failed ({status}): {}", err.error),
                Err(_) => format!("scrape failed ({status})"),
            }
        });

        self.page = 1;
        self.selected = 0;
        self.refresh(client).await;
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn scrape_message(s: &ScrapeResponse) -> String {
    if s.session_regenerated {
        format!("stored {} sales (session regenerated)", s.stored)
    } else {
        format!("stored {} sales", s.stored)
    }
}

/// Two decimals plus currency, or `N/A` for an empty snapshot.
pub fn format_indicator(count: usize, value: f64, currency: &str) -> String {
    if count == 0 {
        "N/A".to_string()
    } else {
        format!("{value:.2} {currency}")
    }
}

pub fn format_days(days: Option<i64>) -> String {
    match days {
        Some(d) => format!("{d} days"),
        None => "No sales data".to_string(),
    }
}

pub fn format_price(p: &PriceResponse) -> String {
    format!("{:.2} {}", p.cents as f64 / 100.0, p.currency_code)
}

pub fn format_date(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or("—".to_string(), |t| t.format("%Y-%m-%d").to_string())
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
