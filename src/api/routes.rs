use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::SalesReport;
use crate::api::health::HealthState;
use crate::config::DEFAULT_SEARCH_LIMIT;
use crate::db::{SalesFilter, SalesSort};
use crate::error::{AppError, Result};
use crate::extractor::is_valid_product_id;
use crate::fetcher::MarketplaceClient;
use crate::scrape::Scraper;
use crate::session::SessionManager;
use crate::types::{Price, SaleRecord, ScrapeReport};

/// Largest page the search endpoint will return.
pub const MAX_SEARCH_LIMIT: i64 = 100;

pub type LiveScraper = Scraper<SessionManager, MarketplaceClient>;

#[derive(Clone)]
pub struct ApiState {
    pub scraper: Arc<LiveScraper>,
    pub session: Arc<SessionManager>,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/sales/search", get(get_sales_search))
        .route("/sales/fetch/:lego_set_id", get(get_sales_fetch))
        .route("/sales/:lego_set_id/indicators", get(get_sales_indicators))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub lego_set_id: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
    /// One of `SalesSort::as_str`; defaults to newest first.
    pub sort: Option<String>,
    /// Inclusive ceiling, in currency units.
    pub max_price: Option<f64>,
    /// Unix ms; undated listings are excluded when set.
    pub published_after: Option<i64>,
}

/// Resolved paging window for a search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: i64,
    pub limit: i64,
}

impl Paging {
    pub fn from_query(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT),
        }
    }

    /// Saturates instead of overflowing on absurd page numbers.
    pub fn skip(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

impl SearchQuery {
    fn into_filter(self) -> Result<(SalesFilter, SalesSort, Paging)> {
        if let Some(id) = &self.lego_set_id {
            if !is_valid_product_id(id) {
                return Err(AppError::InvalidProductId(id.clone()));
            }
        }
        let paging = Paging::from_query(self.page, self.limit);
        let sort = match self.sort.as_deref() {
            Some(raw) => raw.parse::<SalesSort>()?,
            None => SalesSort::default(),
        };
        let published_after = match self.published_after {
            Some(ms) => Some(
                Utc.timestamp_millis_opt(ms)
                    .single()
                    .ok_or_else(|| AppError::InvalidQuery(format!("publishedAfter out of range: {ms}")))?,
            ),
            None => None,
        };
        let max_price_cents = match self.max_price {
            Some(p) => Some(
                Price::from_amount(p, "")
                    .ok_or_else(|| AppError::InvalidQuery(format!("maxPrice must be a non-negative amount: {p}")))?
                    .cents,
            ),
            None => None,
        };
        let filter = SalesFilter {
            snapshot_id: self.lego_set_id,
            max_price_cents,
            published_after,
        };
        Ok((filter, sort, paging))
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub results: Vec<SaleRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub scrapes_ok: u64,
    pub scrapes_failed: u64,
    pub session_regenerations: u64,
    /// Unix ms, absent before the first successful scrape.
    pub last_scrape_at_ms: Option<i64>,
    pub session_cached: bool,
    pub stored_sales: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ack": true }))
}

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>> {
    let last = state.health.last_scrape_at_ms();
    Ok(Json(HealthResponse {
        scrapes_ok: state.health.scrapes_ok(),
        scrapes_failed: state.health.scrapes_failed(),
        session_regenerations: state.health.session_regenerations(),
        last_scrape_at_ms: (last > 0).then_some(last),
        session_cached: state.session.has_session().await,
        stored_sales: state.scraper.store().count_all().await?,
    }))
}

async fn get_sales_search(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let (filter, sort, paging) = params.into_filter()?;
    let page = state
        .scraper
        .store()
        .query(&filter, sort, paging.limit, paging.skip())
        .await?;

    Ok(Json(SearchResponse {
        page: paging.page,
        limit: paging.limit,
        total: page.total,
        total_pages: paging.total_pages(page.total),
        results: page.records,
    }))
}

async fn get_sales_fetch(
    State(state): State<ApiState>,
    Path(lego_set_id): Path<String>,
) -> Result<Json<ScrapeReport>> {
    Ok(Json(state.scraper.scrape_product(&lego_set_id).await?))
}

async fn get_sales_indicators(
    State(state): State<ApiState>,
    Path(lego_set_id): Path<String>,
) -> Result<Json<SalesReport>> {
    Ok(Json(state.scraper.report(&lego_set_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{memory_pool, SalesStore};
    use crate::types::fixtures::sale;

    async fn test_state() -> ApiState {
        // Port 9 is never listening; none of these tests should reach the network.
        let cfg = Config::for_tests("http://127.0.0.1:9");
        let session = Arc::new(SessionManager::new(&cfg).unwrap());
        let source = Arc::new(MarketplaceClient::new(&cfg).unwrap());
        let health = Arc::new(HealthState::new());
        let store = SalesStore::new(memory_pool().await.unwrap());
        let scraper = Arc::new(Scraper::new(session.clone(), source, store, health.clone()));
        ApiState { scraper, session, health }
    }

    #[test]
    fn paging_defaults_and_clamps() {
        assert_eq!(
            Paging::from_query(None, None),
            Paging { page: 1, limit: DEFAULT_SEARCH_LIMIT }
        );
        assert_eq!(Paging::from_query(Some(0), Some(0)), Paging { page: 1, limit: 1 });
        assert_eq!(Paging::from_query(Some(-3), Some(10_000)).limit, MAX_SEARCH_LIMIT);
    }

    #[test]
    fn total_pages_rounds_up() {
        let paging = Paging { page: 1, limit: 12 };
        assert_eq!(paging.total_pages(0), 0);
        assert_eq!(paging.total_pages(12), 1);
        assert_eq!(paging.total_pages(13), 2);
        assert_eq!(Paging { page: 3, limit: 12 }.skip(), 24);
    }

    #[test]
    fn search_query_converts_max_price_to_cents() {
        let q = SearchQuery {
            lego_set_id: Some("42182".into()),
            max_price: Some(49.99),
            ..Default::default()
        };
        let (filter, sort, _) = q.into_filter().unwrap();
        assert_eq!(filter.snapshot_id.as_deref(), Some("42182"));
        assert_eq!(filter.max_price_cents, Some(4999));
        assert_eq!(sort, SalesSort::Newest);
    }

    #[test]
    fn search_query_rejects_negative_or_non_finite_max_price() {
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let q = SearchQuery { max_price: Some(bad), ..Default::default() };
            assert!(matches!(q.into_filter(), Err(AppError::InvalidQuery(_))), "{bad}");
        }
    }

    #[test]
    fn huge_page_saturates_offset() {
        let q = SearchQuery { page: Some(i64::MAX), limit: Some(12), ..Default::default() };
        let (_, _, paging) = q.into_filter().unwrap();
        assert_eq!(paging.page, i64::MAX);
        assert_eq!(paging.skip(), i64::MAX);
    }

    #[test]
    fn search_query_rejects_unknown_sort() {
        let q = SearchQuery { sort: Some("cheapest".into()), ..Default::default() };
        assert!(matches!(q.into_filter(), Err(AppError::InvalidQuery(_))));
    }

    #[test]
    fn search_query_rejects_bad_set_id() {
        let q = SearchQuery { lego_set_id: Some("4218".into()), ..Default::default() };
        assert!(matches!(q.into_filter(), Err(AppError::InvalidProductId(_))));
    }

    #[tokio::test]
    async fn search_paginates_stored_snapshot() {
        let state = test_state().await;
        let records: Vec<_> = (0..5).map(|i| sale(&i.to_string(), 10.0 + i as f64, None)).collect();
        state.scraper.store().replace_snapshot("42182", &records).await.unwrap();

        let params = SearchQuery {
            lego_set_id: Some("42182".into()),
            limit: Some(2),
            page: Some(3),
            sort: Some("price_asc".into()),
            ..Default::default()
        };
        let Json(resp) = get_sales_search(State(state), Query(params)).await.unwrap();
        assert_eq!(resp.total, 5);
        assert_eq!(resp.total_pages, 3);
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].external_id, "4");
    }

    #[tokio::test]
    async fn search_past_last_page_is_empty() {
        let state = test_state().await;
        state.scraper.store().replace_snapshot("42182", &[sale("1", 10.0, None)]).await.unwrap();

        let params = SearchQuery { page: Some(i64::MAX), ..Default::default() };
        let Json(resp) = get_sales_search(State(state), Query(params)).await.unwrap();
        assert_eq!(resp.total, 1);
        assert!(resp.results.is_empty());
    }

    #[tokio::test]
    async fn fetch_rejects_malformed_id_without_network() {
        let state = test_state().await;
        let err = get_sales_fetch(State(state.clone()), Path("abc".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidProductId(_)));
        assert_eq!(state.health.scrapes_failed(), 0);
    }

    #[tokio::test]
    async fn indicators_for_stored_snapshot() {
        let state = test_state().await;
        let records = [
            sale("a", 5.0, None),
            sale("b", 15.0, None),
            sale("c", 25.0, None),
            sale("d", 35.0, None),
        ];
        state.scraper.store().replace_snapshot("42182", &records).await.unwrap();

        let Json(report) = get_sales_indicators(State(state), Path("42182".into()))
            .await
            .unwrap();
        assert_eq!(report.indicators.count, 4);
        assert_eq!(report.indicators.average, 20.0);
        assert!(report.lifetime.is_no_data());
    }

    #[tokio::test]
    async fn health_reports_empty_service() {
        let state = test_state().await;
        let Json(h) = get_health(State(state)).await.unwrap();
        assert_eq!(h.scrapes_ok, 0);
        assert_eq!(h.last_scrape_at_ms, None);
        assert!(!h.session_cached);
        assert_eq!(h.stored_sales, 0);
    }
}
