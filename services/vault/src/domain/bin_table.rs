//! Static BIN (Bank Identification Number) lookup for card-type resolution.
//!
//! A compiled-in table keyed by the PAN's first 6 digits, matching the shape
//! of a cached metadata lookup but with no network call — card type is
//! synchronous, local classification, not a remote fetch.

use crate::domain::card::CardType;

const TABLE: &[(&str, CardType)] = &[
    ("424242", CardType::Credit),
    ("400000", CardType::Debit),
    ("450000", CardType::Credit),
    ("550000", CardType::Credit),
    ("510000", CardType::Debit),
    ("340000", CardType::Credit),
    ("601100", CardType::Prepaid),
];

/// Resolve a card type from the first 6 digits of a PAN, falling back to
/// `Unknown` when the BIN is not in the table.
#[must_use]
pub fn bin_info(bin: &str) -> CardType {
    TABLE
        .iter()
        .find(|(prefix, _)| *prefix == bin)
        .map_or(CardType::Unknown, |(_, ty)| *ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_bin_resolves() {
        assert_eq!(bin_info("424242"), CardType::Credit);
    }

    #[test]
    fn unknown_bin_falls_back() {
        assert_eq!(bin_info("999999"), CardType::Unknown);
    }
}
