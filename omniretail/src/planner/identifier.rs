//! Explicit order reference extraction.

use regex::Regex;
use std::sync::LazyLock;

/// Matches `order 42`, `order #42`, `order id 42`, `order number: 42`,
/// `order no. 42`.
static ORDER_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)\border\s*(?:id|number|no\.?|#)?\s*[:#]?\s*(\d+)")
        .expect("order reference pattern is valid")
});

/// Returns the first explicit order identifier in `query` that fits an
/// `i64`.
#[must_use]
pub fn extract_order_id(query: &str) -> Option<i64> {
    ORDER_REFERENCE
        .captures_iter(query)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| m.as_str().parse().ok())
}
