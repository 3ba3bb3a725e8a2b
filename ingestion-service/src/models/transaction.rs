//! Ledger record produced by statement ingestion.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a statement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Debit,
    Credit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Primary/detailed finance category code pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceCategory {
    pub primary: String,
    pub detailed: String,
}

impl FinanceCategory {
    pub fn new(primary: impl Into<String>, detailed: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            detailed: detailed.into(),
        }
    }
}

/// One ingested line item, keyed by `source_id` inside its owner's period bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub source_id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub description: String,
    /// Signed: negative for money leaving the account.
    pub amount: Decimal,
    pub is_expense: bool,
    pub merchant_name: String,
    pub category: Vec<String>,
    pub personal_finance_category: FinanceCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    /// Zero-based line within the statement that first stored the record.
    /// Orders same-day records the way the bank listed them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Year-month bucket (`YYYY-MM`) the record is sharded into.
    pub fn period(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.statement_line = Some(line);
        self
    }

    /// Newest first: date, then statement line, then source id.
    pub fn newest_first(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.date
            .cmp(&a.date)
            .then_with(|| b.statement_line.cmp(&a.statement_line))
            .then_with(|| a.source_id.cmp(&b.source_id))
    }

    pub fn magnitude(&self) -> Decimal {
        self.amount.abs()
    }
}
