//! Service-order identifier allocation.
//!
//! Identifiers look like `SRV-00042`. The next identifier is always computed
//! from the identifiers currently present in the store: the lowest interior
//! gap is reused first (rows deleted by hand in the sheet), otherwise the
//! number after the current maximum is issued. Nothing is reserved here;
//! callers write the new record right after allocating.

use std::collections::BTreeSet;

pub const ORDER_ID_PREFIX: &str = "SRV-";
const MIN_DIGITS: usize = 5;

/// Parse the numeric suffix of a well-formed identifier.
///
/// Accepts `SRV-` followed by at least five ASCII digits. Anything else
/// (wrong prefix, short suffix, stray characters) yields `None`.
pub fn parse_order_number(raw: &str) -> Option<u32> {
    let digits = raw.trim().strip_prefix(ORDER_ID_PREFIX)?;
    if digits.len() < MIN_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok()
}

pub fn format_order_id(number: u32) -> String {
    format!("{ORDER_ID_PREFIX}{number:05}")
}

pub fn is_valid_order_id(raw: &str) -> bool {
    parse_order_number(raw).is_some()
}

/// Compute the next order number from the existing identifiers.
///
/// Malformed identifiers are skipped. An empty set yields 1.
pub fn next_order_number<'a, I>(existing: I) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: BTreeSet<u32> = existing
        .into_iter()
        .filter_map(parse_order_number)
        .filter(|n| *n > 0)
        .collect();

    let mut expected = 1u32;
    for n in &taken {
        if *n != expected {
            return expected;
        }
        expected = expected.saturating_add(1);
    }
    expected
}

pub fn next_order_id<'a, I>(existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    format_order_id(next_order_number(existing))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(numbers: &[u32]) -> Vec<String> {
        numbers.iter().map(|n| format_order_id(*n)).collect()
    }

    fn next(existing: &[String]) -> u32 {
        next_order_number(existing.iter().map(String::as_str))
    }

    #[test]
    fn empty_store_starts_at_one() {
        assert_eq!(next(&[]), 1);
    }

    #[test]
    fn dense_ids_extend_past_maximum() {
        assert_eq!(next(&ids(&[1, 2, 3])), 4);
    }

    #[test]
    fn interior_gap_is_reused() {
        assert_eq!(next(&ids(&[1, 2, 4, 5])), 3);
    }

    #[test]
    fn lowest_gap_wins() {
        assert_eq!(next(&ids(&[2, 5, 6])), 1);
        assert_eq!(next(&ids(&[1, 3, 5])), 2);
    }

    #[test]
    fn unordered_input_is_fine() {
        assert_eq!(next(&ids(&[4, 1, 2])), 3);
    }

    #[test]
    fn malformed_ids_do_not_affect_scan() {
        let mut existing = ids(&[1, 2]);
        existing.extend(
            [
                "SRV-12",
                "srv-00003",
                "SRV-0000A",
                "ORD-00003",
                "",
                "SRV-",
                "SRV-00009x",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        assert_eq!(next(&existing), 3);
    }

    #[test]
    fn only_malformed_ids_behave_like_empty() {
        let existing = vec!["garbage".to_string(), "SRV-1".to_string()];
        assert_eq!(next(&existing), 1);
    }

    #[test]
    fn parse_accepts_padded_and_wide_ids() {
        assert_eq!(parse_order_number("SRV-00042"), Some(42));
        assert_eq!(parse_order_number("  SRV-00007 "), Some(7));
        assert_eq!(parse_order_number("SRV-123456"), Some(123_456));
        assert_eq!(parse_order_number("SRV-4242"), None);
    }

    #[test]
    fn format_pads_to_five_digits() {
        assert_eq!(format_order_id(3), "SRV-00003");
        assert_eq!(format_order_id(100_000), "SRV-100000");
        assert_eq!(next_order_id(["SRV-00001"]), "SRV-00002");
    }

    #[test]
    fn zero_is_not_an_allocated_number() {
        assert_eq!(next(&ids(&[0])), 1);
        assert_eq!(next(&ids(&[0, 1])), 2);
    }
}
