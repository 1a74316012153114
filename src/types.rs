use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// Listing price as integer cents plus ISO currency code.
///
/// Amounts are kept as cents so snapshots stored and reloaded from SQLite
/// produce bit-identical analytics. Never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub cents: i64,
    pub currency_code: String,
}

impl Price {
    /// Builds a price from a decimal amount. Rejects negative, NaN and infinite amounts.
    pub fn from_amount(amount: f64, currency_code: &str) -> Option<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        Some(Self {
            cents: (amount * 100.0).round() as i64,
            currency_code: currency_code.to_string(),
        })
    }

    #[inline]
    pub fn amount(&self) -> f64 {
        self.cents as f64 / 100.0
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} {}", self.amount(), self.currency_code)
    }
}

// ---------------------------------------------------------------------------
// Sale record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seller {
    pub username: String,
    pub profile_url: String,
}

/// One secondary-market listing, normalized from the marketplace payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    /// Upstream listing id. Unique within the store, not stable across scrapes.
    pub external_id: String,
    pub title: String,
    pub price: Price,
    /// Five-digit LEGO set number, when the listing names one.
    pub product_id: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub seller: Seller,
    pub link: String,
    pub image: String,
    pub favorites_count: u32,
    pub views_count: u32,
}

// ---------------------------------------------------------------------------
// Derived analytics
// ---------------------------------------------------------------------------

/// Price statistics for one snapshot. Recomputed on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PriceIndicators {
    pub count: usize,
    /// Full-precision mean; round only when rendering.
    pub average: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
}

impl PriceIndicators {
    /// Renders an amount the way the indicators panel shows it: two decimals,
    /// or `N/A` when the snapshot is empty.
    pub fn display_amount(&self, value: f64, currency: &str) -> String {
        if self.count == 0 {
            "N/A".to_string()
        } else {
            format!("{value:.2} {currency}")
        }
    }
}

/// Age metrics, in whole days, derived from listing publication dates.
/// `None` on both fields is the "no data" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeValue {
    pub observed_span_days: Option<i64>,
    pub span_to_present_days: Option<i64>,
}

impl LifetimeValue {
    pub const NO_DATA: LifetimeValue = LifetimeValue {
        observed_span_days: None,
        span_to_present_days: None,
    };

    pub fn is_no_data(&self) -> bool {
        self.observed_span_days.is_none() && self.span_to_present_days.is_none()
    }
}

pub fn format_days(days: Option<i64>) -> String {
    match days {
        Some(d) => format!("{d} days"),
        None => "No sales data".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Scrape bookkeeping
// ---------------------------------------------------------------------------

/// Per-fetch tallies, logged after every marketplace call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub api_total: usize,
    pub rejected_brand: usize,
    pub rejected_price: usize,
    pub rejected_malformed: usize,
    pub duplicates: usize,
    pub kept: usize,
    pub missing_published_at: usize,
}

/// Outcome of one product scrape, returned to the API / CLI caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeReport {
    pub product_id: String,
    pub stored: usize,
    pub session_regenerated: bool,
    pub stats: FetchStats,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A listing with just enough populated to exercise analytics and storage.
    pub fn sale(external_id: &str, amount: f64, published_ms: Option<i64>) -> SaleRecord {
        SaleRecord {
            external_id: external_id.to_string(),
            title: format!("LEGO 42182 listing {external_id}"),
            price: Price::from_amount(amount, "EUR").expect("non-negative fixture price"),
            product_id: Some("42182".to_string()),
            published_at: published_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            seller: Seller {
                username: "seller".to_string(),
                profile_url: "https://www.vinted.fr/member/1".to_string(),
            },
            link: format!("https://www.vinted.fr/items/{external_id}"),
            image: "https://images.example/1.jpg".to_string(),
            favorites_count: 0,
            views_count: 0,
        }
    }
}
