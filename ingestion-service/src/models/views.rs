//! Aggregated per-owner views served through the read-through cache.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Insight, ProfileEntry, TransactionRecord};
use crate::cache::CacheView;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryView {
    pub id: String,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl From<ProfileEntry> for EntryView {
    fn from(entry: ProfileEntry) -> Self {
        Self {
            id: entry.id,
            payload: entry.payload,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightView {
    pub id: String,
    pub analysis_type: String,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<Insight> for InsightView {
    fn from(insight: Insight) -> Self {
        Self {
            id: insight.id,
            analysis_type: insight.analysis_type,
            content: insight.content,
            created_at: insight.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub transactions: Vec<TransactionRecord>,
    pub balance: Option<Decimal>,
    pub balance_updated: Option<NaiveDate>,
    pub goals: Vec<EntryView>,
    pub income_sources: Vec<EntryView>,
    /// Expense totals keyed by display name of the finance primary code.
    pub spending_summary: BTreeMap<String, Decimal>,
    /// Current calendar month only.
    pub total_spending: Decimal,
    pub total_earnings: Decimal,
    pub cached_at: DateTime<Utc>,
}

impl CacheView for DashboardView {
    fn is_empty_view(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionsView {
    pub transactions: Vec<TransactionRecord>,
    pub cached_at: DateTime<Utc>,
}

impl CacheView for TransactionsView {
    fn is_empty_view(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsView {
    pub quick_insight: Option<InsightView>,
    pub spending_analysis: Option<InsightView>,
    pub savings_advice: Option<InsightView>,
    pub analysis_history: Vec<InsightView>,
    pub cached_at: DateTime<Utc>,
}

impl CacheView for InsightsView {
    fn is_empty_view(&self) -> bool {
        false
    }
}
