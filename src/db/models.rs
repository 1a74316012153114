/// Row types for the `sales` table (see `migrations/`).
use chrono::{TimeZone, Utc};

use crate::types::{Price, SaleRecord, Seller};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SaleRow {
    pub external_id: String,
    pub snapshot_id: String,
    pub product_id: Option<String>,
    pub title: String,
    pub price_cents: i64,
    pub currency_code: String,
    /// Unix milliseconds.
    pub published_at: Option<i64>,
    pub seller_username: String,
    pub seller_profile_url: String,
    pub link: String,
    pub image: String,
    pub favorites_count: i64,
    pub views_count: i64,
    pub position: i64,
    pub scraped_at: i64,
}

impl From<SaleRow> for SaleRecord {
    fn from(r: SaleRow) -> Self {
        SaleRecord {
            external_id: r.external_id,
            title: r.title,
            price: Price {
                cents: r.price_cents.max(0),
                currency_code: r.currency_code,
            },
            product_id: r.product_id,
            published_at: r
                .published_at
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            seller: Seller {
                username: r.seller_username,
                profile_url: r.seller_profile_url,
            },
            link: r.link,
            image: r.image,
            favorites_count: u32::try_from(r.favorites_count).unwrap_or(0),
            views_count: u32::try_from(r.views_count).unwrap_or(0),
        }
    }
}
