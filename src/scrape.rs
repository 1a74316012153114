//! Per-product scrape flow: session → search → (one retry on expiry) → store.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use futures_util::{stream, StreamExt};
use tracing::{error, info, warn};

use crate::analytics::{sales_report, SalesReport};
use crate::api::health::HealthState;
use crate::db::SalesStore;
use crate::error::{AppError, Result};
use crate::extractor::is_valid_product_id;
use crate::fetcher::{ListingSource, Listings};
use crate::session::SessionSource;
use crate::types::ScrapeReport;

pub struct Scraper<S, L> {
    session: Arc<S>,
    source: Arc<L>,
    store: SalesStore,
    health: Arc<HealthState>,
    /// Product ids with a scrape currently running.
    in_flight: DashSet<String>,
}

impl<S: SessionSource, L: ListingSource> Scraper<S, L> {
    pub fn new(session: Arc<S>, source: Arc<L>, store: SalesStore, health: Arc<HealthState>) -> Self {
        Self {
            session,
            source,
            store,
            health,
            in_flight: DashSet::new(),
        }
    }

    pub fn store(&self) -> &SalesStore {
        &self.store
    }

    /// Fetches the current listings for `product_id` and replaces its stored
    /// snapshot. On any failure the stored snapshot is left as it was.
    pub async fn scrape_product(&self, product_id: &str) -> Result<ScrapeReport> {
        if !is_valid_product_id(product_id) {
            return Err(AppError::InvalidProductId(product_id.to_string()));
        }
        let _claim = InFlight::claim(&self.in_flight, product_id)?;

        info!(product_id, "[SCRAPE] {product_id}: starting");
        let result = self.run(product_id).await;
        match &result {
            Ok(report) => {
                self.health.record_success(Utc::now().timestamp_millis());
                info!(
                    product_id,
                    stored = report.stored,
                    "[SCRAPE] {product_id}: stored {} listings{}",
                    report.stored,
                    if report.session_regenerated { " (session regenerated)" } else { "" },
                );
            }
            Err(e) => {
                self.health.record_failure();
                error!(product_id, "[SCRAPE] {product_id}: failed: {e}");
            }
        }
        result
    }

    async fn run(&self, product_id: &str) -> Result<ScrapeReport> {
        let (listings, session_regenerated) =
            fetch_with_session(self.session.as_ref(), self.source.as_ref(), &self.health, product_id)
                .await?;
        let stored = self.store.replace_snapshot(product_id, &listings.records).await?;
        Ok(ScrapeReport {
            product_id: product_id.to_string(),
            stored,
            session_regenerated,
            stats: listings.stats,
        })
    }

    /// Scrapes several ids, at most `concurrency` at a time. Each id succeeds
    /// or fails on its own; results come back in completion order.
    pub async fn scrape_many(
        &self,
        product_ids: &[String],
        concurrency: usize,
    ) -> Vec<(String, Result<ScrapeReport>)> {
        stream::iter(product_ids)
            .map(|id| async move { (id.clone(), self.scrape_product(id).await) })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    /// Indicators and lifetime value for the stored snapshot of `product_id`.
    pub async fn report(&self, product_id: &str) -> Result<SalesReport> {
        if !is_valid_product_id(product_id) {
            return Err(AppError::InvalidProductId(product_id.to_string()));
        }
        let records = self.store.load_snapshot(product_id).await?;
        Ok(sales_report(product_id, &records))
    }
}

/// One search with the current session. A 401/403 regenerates the session
/// and retries exactly once; a second rejection is returned as is.
///
/// Returns the listings and whether the session had to be regenerated.
pub async fn fetch_with_session<S, L>(
    session: &S,
    source: &L,
    health: &HealthState,
    query: &str,
) -> Result<(Listings, bool)>
where
    S: SessionSource,
    L: ListingSource,
{
    let cookies = session.acquire().await?;
    match source.fetch_listings(query, &cookies).await {
        Err(AppError::AuthExpired { status }) => {
            warn!(query, status, "[SCRAPE] {query}: session rejected (HTTP {status}), regenerating");
            let fresh = session.regenerate(&cookies).await?;
            health.record_regeneration();
            let listings = source.fetch_listings(query, &fresh).await?;
            Ok((listings, true))
        }
        other => other.map(|listings| (listings, false)),
    }
}

/// Splits `scrape_many` output into the successful reports. Fails with the
/// last error seen when no id succeeded; failures are logged either way.
pub fn successes_or_last_error(
    results: Vec<(String, Result<ScrapeReport>)>,
) -> Result<Vec<(String, ScrapeReport)>> {
    let mut ok = Vec::with_capacity(results.len());
    let mut last_err = None;
    for (id, result) in results {
        match result {
            Ok(report) => ok.push((id, report)),
            Err(e) => {
                warn!(product_id = %id, "[SCRAPE] {id}: {e}");
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) if ok.is_empty() => Err(e),
        _ => Ok(ok),
    }
}

/// Marks a product id busy for the lifetime of the value.
struct InFlight<'a> {
    set: &'a DashSet<String>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a DashSet<String>, id: &str) -> Result<Self> {
        if !set.insert(id.to_string()) {
            return Err(AppError::ScrapeInProgress(id.to_string()));
        }
        Ok(Self { set, id: id.to_string() })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}
