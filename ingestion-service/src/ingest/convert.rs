use chrono::Utc;

use super::classifier::Classifier;
use super::identifier::source_id;
use super::parser::ParsedRow;
use crate::models::{EntryKind, TransactionRecord};

/// Account id stamped on every record that arrived through a statement upload.
pub const UPLOADED_ACCOUNT_ID: &str = "uploaded_csv";

/// Processor and channel suffixes banks append to merchant descriptors,
/// stripped in this order, at most once each.
const MERCHANT_SUFFIXES: [&str; 5] = ["_V", "MSP", "PRO", "GST", "EPAY"];

pub fn merchant_name(description: &str) -> String {
    let mut name = description.trim();
    for suffix in MERCHANT_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            if stripped.ends_with(char::is_whitespace) {
                name = stripped.trim_end();
            }
        }
    }
    name.to_string()
}

pub fn to_record(owner_id: &str, row: &ParsedRow, classifier: &dyn Classifier) -> TransactionRecord {
    let classification = classifier.classify(&row.description);
    let now = Utc::now();

    TransactionRecord {
        source_id: source_id(owner_id, row.date, &row.description, row.amount, row.kind),
        account_id: UPLOADED_ACCOUNT_ID.to_string(),
        date: row.date,
        description: row.description.clone(),
        amount: row.amount,
        is_expense: row.kind == EntryKind::Debit,
        merchant_name: merchant_name(&row.description),
        category: classification.category,
        personal_finance_category: classification.personal_finance_category,
        balance: row.balance,
        statement_line: None,
        created_at: Some(now),
        updated_at: Some(now),
    }
}
