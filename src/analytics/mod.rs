//! Sales analytics over a single product snapshot.
//!
//! Everything here is pure: callers pass a plain slice of normalized records
//! (any response envelope is already unwrapped) and always get a value back.
//! Dirty upstream data degrades to sentinels instead of errors.

pub mod indicators;
pub mod lifetime;

pub use indicators::{average_price, indicators, percentile};
pub use lifetime::{lifetime_value, lifetime_value_at};

use std::fmt;

use serde::Serialize;

use crate::types::{format_days, LifetimeValue, PriceIndicators, SaleRecord};

/// Everything the presentation layer shows for one set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub product_id: String,
    pub currency: Option<String>,
    pub indicators: PriceIndicators,
    pub lifetime: LifetimeValue,
}

/// Bundles price indicators and lifetime value computed from the same slice.
pub fn sales_report(product_id: &str, records: &[SaleRecord]) -> SalesReport {
    SalesReport {
        product_id: product_id.to_string(),
        currency: records.first().map(|r| r.price.currency_code.clone()),
        indicators: indicators(records),
        lifetime: lifetime_value(records),
    }
}

impl fmt::Display for SalesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cur = self.currency.as_deref().unwrap_or("");
        let ind = &self.indicators;
        writeln!(f, "{} ({} sales)", self.product_id, ind.count)?;
        writeln!(f, "  average  {}", ind.display_amount(ind.average, cur))?;
        writeln!(f, "  p5       {}", ind.display_amount(ind.p5, cur))?;
        writeln!(f, "  p25      {}", ind.display_amount(ind.p25, cur))?;
        writeln!(f, "  median   {}", ind.display_amount(ind.p50, cur))?;
        writeln!(f, "  span     {}", format_days(self.lifetime.observed_span_days))?;
        write!(f, "  age      {}", format_days(self.lifetime.span_to_present_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::sale;

    #[test]
    fn report_for_empty_snapshot_is_all_sentinels() {
        let report = sales_report("42182", &[]);
        assert_eq!(report.currency, None);
        assert_eq!(report.indicators, PriceIndicators::default());
        assert!(report.lifetime.is_no_data());
    }

    #[test]
    fn report_carries_currency_of_first_listing() {
        let records = vec![sale("1", 10.0, Some(0)), sale("2", 20.0, None)];
        let report = sales_report("42182", &records);
        assert_eq!(report.currency.as_deref(), Some("EUR"));
        assert_eq!(report.indicators.count, 2);
    }

    #[test]
    fn display_shows_placeholders_for_empty_snapshot() {
        let text = sales_report("10294", &[]).to_string();
        assert!(text.starts_with("10294 (0 sales)"));
        assert!(text.contains("average  N/A"));
        assert!(text.contains("span     No sales data"));
    }

    #[test]
    fn display_rounds_to_two_decimals() {
        let records = vec![sale("1", 10.0, None), sale("2", 20.5, None)];
        let text = sales_report("42182", &records).to_string();
        assert!(text.contains("average  15.25 EUR"));
        assert!(text.contains("p5       10.00 EUR"));
    }
}
