//! LEGO set number extraction from free-text listing titles.

use std::sync::LazyLock;

use regex::Regex;

/// A run of exactly five ASCII digits with no digit on either side.
static SET_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])([0-9]{5})(?:[^0-9]|$)").expect("valid set number pattern")
});

/// Returns the first standalone five-digit run in `title`.
///
/// Digits embedded in a longer number never match: `"Set 142182X"` yields `None`.
/// Letters count as boundaries, so `"LEGO42182"` yields `"42182"`.
pub fn extract_product_id(title: &str) -> Option<String> {
    SET_NUMBER
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// True when `id` is a canonical set number (`^\d{5}$`).
pub fn is_valid_product_id(id: &str) -> bool {
    id.len() == 5 && id.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_set_number_between_words() {
        assert_eq!(extract_product_id("LEGO Technic 42182 Truck").as_deref(), Some("42182"));
    }

    #[test]
    fn ignores_digits_inside_longer_run() {
        assert_eq!(extract_product_id("Set 142182X"), None);
        assert_eq!(extract_product_id("ref 1234567"), None);
    }

    #[test]
    fn no_digits_is_none() {
        assert_eq!(extract_product_id("No numbers here"), None);
        assert_eq!(extract_product_id(""), None);
    }

    #[test]
    fn matches_at_string_edges() {
        assert_eq!(extract_product_id("75192").as_deref(), Some("75192"));
        assert_eq!(extract_product_id("Millennium Falcon 75192").as_deref(), Some("75192"));
        assert_eq!(extract_product_id("LEGO42182").as_deref(), Some("42182"));
    }

    #[test]
    fn first_standalone_run_wins() {
        assert_eq!(
            extract_product_id("lot 123456 + 10294 + 42182").as_deref(),
            Some("10294")
        );
    }

    #[test]
    fn short_runs_skipped() {
        assert_eq!(extract_product_id("4 pieces, 1234 bricks, set 60337").as_deref(), Some("60337"));
    }

    #[test]
    fn validates_ids() {
        assert!(is_valid_product_id("42182"));
        assert!(!is_valid_product_id("4218"));
        assert!(!is_valid_product_id("421823"));
        assert!(!is_valid_product_id("4218a"));
        assert!(!is_valid_product_id("４２１８２"));
    }
}
