use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::db::models::SaleRow;
use crate::error::{AppError, Result};
use crate::types::SaleRecord;

const SALE_COLUMNS: &str = "external_id, snapshot_id, product_id, title, price_cents, currency_code, \
     published_at, seller_username, seller_profile_url, link, image, \
     favorites_count, views_count, position, scraped_at";

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SalesSort {
    /// Most recently published first; undated listings last.
    #[default]
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
    MostFavorited,
    MostViewed,
}

impl SalesSort {
    pub const ALL: [SalesSort; 6] = [
        SalesSort::Newest,
        SalesSort::Oldest,
        SalesSort::PriceAsc,
        SalesSort::PriceDesc,
        SalesSort::MostFavorited,
        SalesSort::MostViewed,
    ];

    fn order_by(self) -> &'static str {
        match self {
            SalesSort::Newest => "published_at IS NULL, published_at DESC, position",
            SalesSort::Oldest => "published_at IS NULL, published_at ASC, position",
            SalesSort::PriceAsc => "price_cents ASC, external_id",
            SalesSort::PriceDesc => "price_cents DESC, external_id",
            SalesSort::MostFavorited => "favorites_count DESC, external_id",
            SalesSort::MostViewed => "views_count DESC, external_id",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SalesSort::Newest => "newest",
            SalesSort::Oldest => "oldest",
            SalesSort::PriceAsc => "price_asc",
            SalesSort::PriceDesc => "price_desc",
            SalesSort::MostFavorited => "most_favorited",
            SalesSort::MostViewed => "most_viewed",
        }
    }
}

impl FromStr for SalesSort {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        SalesSort::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| AppError::InvalidQuery(format!("unknown sort `{s}`")))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SalesFilter {
    pub snapshot_id: Option<String>,
    pub max_price_cents: Option<i64>,
    pub published_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SalesPage {
    pub records: Vec<SaleRecord>,
    /// Matching rows before `limit`/`skip`.
    pub total: i64,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite-backed sale listings. Assumes one writer per snapshot id.
#[derive(Clone)]
pub struct SalesStore {
    pool: SqlitePool,
}

impl SalesStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Swaps the stored snapshot for `snapshot_id` with `records` in one
    /// transaction. Rows of other snapshots are only touched when they share an
    /// `external_id` with the new records, in which case the newer scrape owns them.
    pub async fn replace_snapshot(&self, snapshot_id: &str, records: &[SaleRecord]) -> Result<usize> {
        let scraped_at = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM sales WHERE snapshot_id = ?")
            .bind(snapshot_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for (position, r) in records.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sales (
                    external_id, snapshot_id, product_id, title, price_cents, currency_code,
                    published_at, seller_username, seller_profile_url, link, image,
                    favorites_count, views_count, position, scraped_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(external_id) DO UPDATE SET
                    snapshot_id = excluded.snapshot_id,
                    product_id = excluded.product_id,
                    title = excluded.title,
                    price_cents = excluded.price_cents,
                    currency_code = excluded.currency_code,
                    published_at = excluded.published_at,
                    seller_username = excluded.seller_username,
                    seller_profile_url = excluded.seller_profile_url,
                    link = excluded.link,
                    image = excluded.image,
                    favorites_count = excluded.favorites_count,
                    views_count = excluded.views_count,
                    position = excluded.position,
                    scraped_at = excluded.scraped_at
                "#,
            )
            .bind(&r.external_id)
            .bind(snapshot_id)
            .bind(&r.product_id)
            .bind(&r.title)
            .bind(r.price.cents)
            .bind(&r.price.currency_code)
            .bind(r.published_at.map(|t| t.timestamp_millis()))
            .bind(&r.seller.username)
            .bind(&r.seller.profile_url)
            .bind(&r.link)
            .bind(&r.image)
            .bind(i64::from(r.favorites_count))
            .bind(i64::from(r.views_count))
            .bind(position as i64)
            .bind(scraped_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            snapshot_id,
            removed,
            inserted = records.len(),
            "[STORE] replaced snapshot {snapshot_id}: {removed} removed, {} inserted",
            records.len(),
        );
        Ok(records.len())
    }

    /// The stored snapshot for `snapshot_id`, in upstream order.
    pub async fn load_snapshot(&self, snapshot_id: &str) -> Result<Vec<SaleRecord>> {
        let rows: Vec<SaleRow> = sqlx::query_as(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE snapshot_id = ? ORDER BY position"
        ))
        .bind(snapshot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SaleRecord::from).collect())
    }

    /// Filtered, sorted page of listings plus the unpaginated match count.
    pub async fn query(
        &self,
        filter: &SalesFilter,
        sort: SalesSort,
        limit: i64,
        skip: i64,
    ) -> Result<SalesPage> {
        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {SALE_COLUMNS} FROM sales"));
        push_filter(&mut select, filter);
        select.push(" ORDER BY ").push(sort.order_by());
        select.push(" LIMIT ").push_bind(limit.max(0));
        select.push(" OFFSET ").push_bind(skip.max(0));
        let rows: Vec<SaleRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sales");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(SalesPage {
            records: rows.into_iter().map(SaleRecord::from).collect(),
            total,
        })
    }

    pub async fn count_all(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &SalesFilter) {
    let mut sep = " WHERE ";
    if let Some(id) = &filter.snapshot_id {
        qb.push(sep).push("snapshot_id = ").push_bind(id.clone());
        sep = " AND ";
    }
    if let Some(max) = filter.max_price_cents {
        qb.push(sep).push("price_cents <= ").push_bind(max);
        sep = " AND ";
    }
    if let Some(after) = filter.published_after {
        qb.push(sep).push("published_at >= ").push_bind(after.timestamp_millis());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::types::fixtures::sale;

    const DAY_MS: i64 = 86_400_000;
    const T0: i64 = 1_739_000_000_000;

    async fn store() -> SalesStore {
        SalesStore::new(memory_pool().await.unwrap())
    }

    #[tokio::test]
    async fn replace_then_load_keeps_upstream_order() {
        let s = store().await;
        let records = vec![sale("b", 30.0, Some(T0)), sale("a", 10.0, None), sale("c", 20.0, Some(T0 + DAY_MS))];
        assert_eq!(s.replace_snapshot("42182", &records).await.unwrap(), 3);

        let loaded = s.load_snapshot("42182").await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn last_scrape_wins() {
        let s = store().await;
        s.replace_snapshot("42182", &[sale("1", 10.0, None), sale("2", 20.0, None)]).await.unwrap();
        s.replace_snapshot("42182", &[sale("3", 30.0, None)]).await.unwrap();

        let loaded = s.load_snapshot("42182").await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, ["3"]);
    }

    #[tokio::test]
    async fn other_snapshots_untouched() {
        let s = store().await;
        s.replace_snapshot("75192", &[sale("x", 700.0, None)]).await.unwrap();
        s.replace_snapshot("42182", &[sale("1", 10.0, None)]).await.unwrap();
        s.replace_snapshot("42182", &[]).await.unwrap();

        assert_eq!(s.load_snapshot("75192").await.unwrap().len(), 1);
        assert!(s.load_snapshot("42182").await.unwrap().is_empty());
        assert_eq!(s.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn external_id_is_unique_across_snapshots() {
        let s = store().await;
        s.replace_snapshot("75192", &[sale("shared", 10.0, None)]).await.unwrap();
        s.replace_snapshot("42182", &[sale("shared", 12.0, None)]).await.unwrap();

        assert_eq!(s.count_all().await.unwrap(), 1);
        assert!(s.load_snapshot("75192").await.unwrap().is_empty());
        assert_eq!(s.load_snapshot("42182").await.unwrap()[0].price.cents, 1200);
    }

    #[tokio::test]
    async fn query_filters_sorts_and_paginates() {
        let s = store().await;
        s.replace_snapshot(
            "42182",
            &[
                sale("1", 50.0, Some(T0)),
                sale("2", 10.0, Some(T0 + 2 * DAY_MS)),
                sale("3", 30.0, None),
                sale("4", 90.0, Some(T0 + DAY_MS)),
            ],
        )
        .await
        .unwrap();
        s.replace_snapshot("75192", &[sale("5", 5.0, Some(T0))]).await.unwrap();

        let filter = SalesFilter {
            snapshot_id: Some("42182".to_string()),
            ..Default::default()
        };

        let page = s.query(&filter, SalesSort::Newest, 10, 0).await.unwrap();
        let ids: Vec<_> = page.records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, ["2", "4", "1", "3"]);
        assert_eq!(page.total, 4);

        let page = s.query(&filter, SalesSort::PriceAsc, 2, 1).await.unwrap();
        let ids: Vec<_> = page.records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, ["3", "1"]);
        assert_eq!(page.total, 4);

        let cheap = SalesFilter { max_price_cents: Some(3000), ..filter.clone() };
        let page = s.query(&cheap, SalesSort::PriceDesc, 10, 0).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.records[0].external_id, "3");

        let all = s.query(&SalesFilter::default(), SalesSort::Oldest, 10, 0).await.unwrap();
        assert_eq!(all.total, 5);
    }

    #[tokio::test]
    async fn published_after_excludes_undated() {
        let s = store().await;
        s.replace_snapshot("42182", &[sale("1", 1.0, Some(T0)), sale("2", 1.0, None), sale("3", 1.0, Some(T0 + DAY_MS))])
            .await
            .unwrap();
        let filter = SalesFilter {
            published_after: Some(chrono::TimeZone::timestamp_millis_opt(&Utc, T0 + 1).unwrap()),
            ..Default::default()
        };
        let page = s.query(&filter, SalesSort::Newest, 10, 0).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].external_id, "3");
    }

    #[test]
    fn sort_names_round_trip() {
        for sort in SalesSort::ALL {
            assert_eq!(sort.as_str().parse::<SalesSort>().unwrap(), sort);
        }
        assert!("cheapest".parse::<SalesSort>().is_err());
    }
}
