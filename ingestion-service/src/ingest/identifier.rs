use chrono::NaiveDate;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::models::EntryKind;

const ID_PREFIX: &str = "txn_";

/// Stable identifier for a statement line.
///
/// Inputs are normalized (description trimmed and lowercased, magnitude
/// rendered with two decimals, date as `YYYY-MM-DD`) and each field is
/// length-prefixed before hashing so no field content can collide with a
/// neighbour. The result is `txn_` followed by the first 16 bytes of the
/// SHA-256 digest in hex.
pub fn source_id(
    owner_id: &str,
    date: NaiveDate,
    description: &str,
    amount: Decimal,
    kind: EntryKind,
) -> String {
    let date = date.format("%Y-%m-%d").to_string();
    let description = description.trim().to_lowercase();
    let magnitude = format!("{:.2}", amount.abs().round_dp(2));

    let mut hasher = Sha256::new();
    for field in [owner_id, &date, &description, &magnitude, kind.as_str()] {
        hasher.update(field.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(field.as_bytes());
        hasher.update(b"|");
    }
    let digest = hasher.finalize();

    format!("{}{}", ID_PREFIX, hex::encode(&digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn same_line_yields_same_id() {
        let a = source_id("u1", date(2024, 1, 15), "COFFEE SHOP", dec("-4.50"), EntryKind::Debit);
        let b = source_id("u1", date(2024, 1, 15), "COFFEE SHOP", dec("-4.50"), EntryKind::Debit);
        assert_eq!(a, b);
        assert!(a.starts_with("txn_"));
        assert_eq!(a.len(), 4 + 32);
    }

    #[test]
    fn description_case_and_padding_are_ignored() {
        let a = source_id("u1", date(2024, 1, 15), "  Coffee Shop ", dec("4.5"), EntryKind::Debit);
        let b = source_id("u1", date(2024, 1, 15), "COFFEE SHOP", dec("-4.50"), EntryKind::Debit);
        assert_eq!(a, b);
    }

    #[test]
    fn each_identity_field_changes_the_id() {
        let base = source_id("u1", date(2024, 1, 15), "coffee", dec("4.50"), EntryKind::Debit);

        assert_ne!(base, source_id("u2", date(2024, 1, 15), "coffee", dec("4.50"), EntryKind::Debit));
        assert_ne!(base, source_id("u1", date(2024, 1, 16), "coffee", dec("4.50"), EntryKind::Debit));
        assert_ne!(base, source_id("u1", date(2024, 1, 15), "tea", dec("4.50"), EntryKind::Debit));
        assert_ne!(base, source_id("u1", date(2024, 1, 15), "coffee", dec("4.51"), EntryKind::Debit));
        assert_ne!(base, source_id("u1", date(2024, 1, 15), "coffee", dec("4.50"), EntryKind::Credit));
    }

    #[test]
    fn field_boundaries_cannot_be_shifted() {
        let a = source_id("u1|x", date(2024, 1, 15), "coffee", dec("1"), EntryKind::Debit);
        let b = source_id("u1", date(2024, 1, 15), "x|coffee", dec("1"), EntryKind::Debit);
        assert_ne!(a, b);
    }
}
