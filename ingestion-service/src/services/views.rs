//! Cached aggregate views: dashboard, transaction listing and insights.

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{OwnerRepository, ProfileService, TransactionQuery, TransactionRepository};
use crate::cache::{CacheKeys, ReadThroughCache};
use crate::models::{
    DashboardView, EntryView, InsightView, InsightsView, TransactionRecord, TransactionsView,
};
use crate::services::profile::ProfileKind;
use crate::store::StoreError;

/// Records the dashboard summarizes.
pub const DASHBOARD_RECORD_LIMIT: usize = 100;

const INSIGHT_HISTORY_LIMIT: usize = 5;

#[derive(Clone)]
pub struct ViewService {
    transactions: TransactionRepository,
    owners: OwnerRepository,
    profile: ProfileService,
    cache: ReadThroughCache,
    ttl: Duration,
}

impl ViewService {
    pub fn new(
        transactions: TransactionRepository,
        owners: OwnerRepository,
        profile: ProfileService,
        cache: ReadThroughCache,
        ttl: Duration,
    ) -> Self {
        Self {
            transactions,
            owners,
            profile,
            cache,
            ttl,
        }
    }

    pub async fn dashboard(&self, owner_id: &str, bypass_cache: bool) -> Result<DashboardView, StoreError> {
        let key = CacheKeys::dashboard(owner_id);
        let load = || self.load_dashboard(owner_id);
        if bypass_cache {
            self.cache.refresh(&key, self.ttl, load).await
        } else {
            self.cache.get_or_load(&key, self.ttl, load).await
        }
    }

    pub async fn transactions(
        &self,
        owner_id: &str,
        limit: Option<usize>,
        bypass_cache: bool,
    ) -> Result<TransactionsView, StoreError> {
        let key = CacheKeys::transactions(owner_id, limit);
        let load = || self.load_transactions(owner_id, limit);
        if bypass_cache {
            self.cache.refresh(&key, self.ttl, load).await
        } else {
            self.cache.get_or_load(&key, self.ttl, load).await
        }
    }

    pub async fn insights(&self, owner_id: &str, bypass_cache: bool) -> Result<InsightsView, StoreError> {
        let key = CacheKeys::insights(owner_id);
        let load = || self.load_insights(owner_id);
        if bypass_cache {
            self.cache.refresh(&key, self.ttl, load).await
        } else {
            self.cache.get_or_load(&key, self.ttl, load).await
        }
    }

    async fn load_dashboard(&self, owner_id: &str) -> Result<DashboardView, StoreError> {
        let query = TransactionQuery::latest(DASHBOARD_RECORD_LIMIT);
        let (transactions, stored_balance, goals, income_sources) = tokio::try_join!(
            self.transactions.list(owner_id, &query),
            self.owners.balance(owner_id),
            self.profile.list_entries(owner_id, ProfileKind::Goal),
            self.profile.list_entries(owner_id, ProfileKind::IncomeSource),
        )?;

        let (balance, balance_updated) = match transactions
            .iter()
            .find_map(|r| r.balance.map(|balance| (balance, r.date)))
        {
            Some((balance, date)) => (Some(balance), Some(date)),
            None => match stored_balance {
                Some(snapshot) => (Some(snapshot.balance), Some(snapshot.as_of)),
                None => (None, None),
            },
        };

        let today = Utc::now().date_naive();
        let (total_spending, total_earnings) = month_totals(&transactions, today);

        Ok(DashboardView {
            spending_summary: spending_summary(&transactions),
            total_spending,
            total_earnings,
            transactions,
            balance,
            balance_updated,
            goals: goals.into_iter().map(EntryView::from).collect(),
            income_sources: income_sources.into_iter().map(EntryView::from).collect(),
            cached_at: Utc::now(),
        })
    }

    async fn load_transactions(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<TransactionsView, StoreError> {
        let query = TransactionQuery {
            limit,
            ..Default::default()
        };
        Ok(TransactionsView {
            transactions: self.transactions.list(owner_id, &query).await?,
            cached_at: Utc::now(),
        })
    }

    async fn load_insights(&self, owner_id: &str) -> Result<InsightsView, StoreError> {
        let (quick_insight, spending_analysis, savings_advice, history) = tokio::try_join!(
            self.profile.latest_insight(owner_id, "quick_insight"),
            self.profile.latest_insight(owner_id, "spending_analysis"),
            self.profile.latest_insight(owner_id, "savings_advice"),
            self.profile.recent_insights(owner_id, INSIGHT_HISTORY_LIMIT),
        )?;

        Ok(InsightsView {
            quick_insight: quick_insight.map(InsightView::from),
            spending_analysis: spending_analysis.map(InsightView::from),
            savings_advice: savings_advice.map(InsightView::from),
            analysis_history: history.into_iter().map(InsightView::from).collect(),
            cached_at: Utc::now(),
        })
    }
}

/// `FOOD_AND_DRINK` becomes `Food And Drink`.
pub fn display_category(code: &str) -> String {
    code.to_lowercase()
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn spending_summary(records: &[TransactionRecord]) -> BTreeMap<String, Decimal> {
    let mut summary: BTreeMap<String, Decimal> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_expense) {
        let primary = if record.personal_finance_category.primary.is_empty() {
            record.category.first().map(String::as_str).unwrap_or("OTHER")
        } else {
            record.personal_finance_category.primary.as_str()
        };
        *summary.entry(display_category(primary)).or_default() += record.magnitude();
    }
    summary
}

fn month_totals(records: &[TransactionRecord], today: NaiveDate) -> (Decimal, Decimal) {
    records
        .iter()
        .filter(|r| r.date.year() == today.year() && r.date.month() == today.month())
        .fold((Decimal::ZERO, Decimal::ZERO), |(spent, earned), r| {
            if r.is_expense {
                (spent + r.magnitude(), earned)
            } else {
                (spent, earned + r.amount.max(Decimal::ZERO))
            }
        })
}
