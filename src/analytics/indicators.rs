use crate::config::percentile_ranks::{P25, P5, P50};
use crate::types::{PriceIndicators, SaleRecord};

/// Mean listing price at full precision. `0.0` for an empty snapshot.
pub fn average_price(records: &[SaleRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let total: f64 = records.iter().map(|r| r.price.amount()).sum();
    total / records.len() as f64
}

/// Nearest-rank percentile by floor: `sorted[floor(p / 100 * n)]`.
///
/// The index is clamped to `[0, n - 1]`, so `p >= 100` returns the maximum and
/// `p <= 0` the minimum. `0.0` for an empty snapshot.
pub fn percentile(records: &[SaleRecord], p: f64) -> f64 {
    let sorted = sorted_amounts(records);
    percentile_of_sorted(&sorted, p)
}

/// Count, mean and p5/p25/p50, all from one sorted copy of `records`.
pub fn indicators(records: &[SaleRecord]) -> PriceIndicators {
    let sorted = sorted_amounts(records);
    PriceIndicators {
        count: records.len(),
        average: average_price(records),
        p5: percentile_of_sorted(&sorted, P5),
        p25: percentile_of_sorted(&sorted, P25),
        p50: percentile_of_sorted(&sorted, P50),
    }
}

fn sorted_amounts(records: &[SaleRecord]) -> Vec<f64> {
    let mut amounts: Vec<f64> = records.iter().map(|r| r.price.amount()).collect();
    amounts.sort_by(|a, b| a.total_cmp(b));
    amounts
}

fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let rank = (p / 100.0 * n as f64).floor();
    // NaN and negative ranks land on 0 via the saturating cast.
    let idx = (rank.max(0.0) as usize).min(n - 1);
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::sale;

    fn priced(amounts: &[f64]) -> Vec<SaleRecord> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| sale(&i.to_string(), *a, None))
            .collect()
    }

    #[test]
    fn average_of_empty_is_zero() {
        assert_eq!(average_price(&[]), 0.0);
    }

    #[test]
    fn average_of_two() {
        assert_eq!(average_price(&priced(&[10.0, 20.0])), 15.0);
    }

    #[test]
    fn average_keeps_full_precision() {
        let avg = average_price(&priced(&[10.0, 10.0, 10.01]));
        assert!((avg - 10.003_333_333).abs() < 1e-6);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        for p in [0.0, 5.0, 50.0, 100.0] {
            assert_eq!(percentile(&[], p), 0.0);
        }
    }

    #[test]
    fn percentile_uses_floor_rank() {
        let records = priced(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(percentile(&records, 5.0), 10.0);
        assert_eq!(percentile(&records, 25.0), 20.0);
        assert_eq!(percentile(&records, 50.0), 30.0);
        assert_eq!(percentile(&records, 99.0), 50.0);
    }

    #[test]
    fn percentile_100_clamps_to_max() {
        let records = priced(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(percentile(&records, 100.0), 50.0);
        assert_eq!(percentile(&records, 250.0), 50.0);
    }

    #[test]
    fn percentile_below_zero_clamps_to_min() {
        let records = priced(&[10.0, 20.0]);
        assert_eq!(percentile(&records, -10.0), 10.0);
        assert_eq!(percentile(&records, f64::NAN), 10.0);
    }

    #[test]
    fn percentile_sorts_unordered_input() {
        let records = priced(&[50.0, 10.0, 40.0, 20.0, 30.0]);
        assert_eq!(percentile(&records, 50.0), 30.0);
    }

    #[test]
    fn indicators_match_reference_snapshot() {
        let mut records = priced(&[5.0, 15.0, 25.0, 35.0]);
        records[2].published_at = None;
        let ind = indicators(&records);
        assert_eq!(
            ind,
            PriceIndicators { count: 4, average: 20.0, p5: 5.0, p25: 15.0, p50: 25.0 }
        );
    }

    #[test]
    fn indicators_are_idempotent() {
        let records = priced(&[12.5, 3.0, 99.99, 41.0]);
        assert_eq!(indicators(&records), indicators(&records));
    }

    #[test]
    fn indicators_of_empty_are_zero() {
        assert_eq!(indicators(&[]), PriceIndicators::default());
    }
}
