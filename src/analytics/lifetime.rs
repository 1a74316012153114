use chrono::{DateTime, Utc};

use crate::config::MS_PER_DAY;
use crate::types::{LifetimeValue, SaleRecord};

/// Lifetime value measured against the current wall clock.
pub fn lifetime_value(records: &[SaleRecord]) -> LifetimeValue {
    lifetime_value_at(records, Utc::now())
}

/// Span between the oldest and newest listing, and from the oldest listing to
/// `now`, both as `ceil(ms / 86_400_000)`.
///
/// Listings without a publication date are skipped. If none remain, both
/// fields are `None`.
pub fn lifetime_value_at(records: &[SaleRecord], now: DateTime<Utc>) -> LifetimeValue {
    let mut stamps = records
        .iter()
        .filter_map(|r| r.published_at)
        .map(|t| t.timestamp_millis());

    let Some(first) = stamps.next() else {
        return LifetimeValue::NO_DATA;
    };
    let (min, max) = stamps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));

    LifetimeValue {
        observed_span_days: Some(ceil_days(max - min)),
        span_to_present_days: Some(ceil_days(now.timestamp_millis() - min)),
    }
}

fn ceil_days(ms: i64) -> i64 {
    (ms as f64 / MS_PER_DAY).ceil() as i64
}
