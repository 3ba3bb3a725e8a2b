//! Transaction buckets and the idempotent batch upsert.
//!
//! Records live in `uploaded_transactions` scoped by owner and `YYYY-MM`
//! period, keyed by their deterministic source id. `ledger_periods` indexes
//! which buckets exist for an owner.

use chrono::{NaiveDate, Utc};
use mongodb::bson::{self, doc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::models::TransactionRecord;
use crate::store::{CollectionPath, DocumentStore, QuerySpec, SortOrder, StoreError, WriteBatch};

pub const TRANSACTIONS_COLLECTION: &str = "uploaded_transactions";
pub const PERIODS_COLLECTION: &str = "ledger_periods";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub added: u32,
    pub modified: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub limit: Option<usize>,
    /// Inclusive lower date bound.
    pub start: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub end: Option<NaiveDate>,
}

impl TransactionQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    fn covers_period(&self, period: &str) -> bool {
        let after_start = self
            .start
            .map_or(true, |start| period >= start.format("%Y-%m").to_string().as_str());
        let before_end = self
            .end
            .map_or(true, |end| period <= end.format("%Y-%m").to_string().as_str());
        after_start && before_end
    }

    fn covers_date(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

#[derive(Clone)]
pub struct TransactionRepository {
    store: Arc<dyn DocumentStore>,
}

impl TransactionRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn bucket(owner_id: &str, period: &str) -> CollectionPath {
        CollectionPath::root(TRANSACTIONS_COLLECTION)
            .scoped("owner_id", owner_id)
            .scoped("period", period)
    }

    fn periods_path(owner_id: &str) -> CollectionPath {
        CollectionPath::root(PERIODS_COLLECTION).scoped("owner_id", owner_id)
    }

    /// Insert new records and touch `updated_at` on ones already stored,
    /// all in one atomic batch. A repeat of a source id within the same
    /// call counts as modified.
    pub async fn upsert(
        &self,
        owner_id: &str,
        records: &[TransactionRecord],
    ) -> Result<UpsertSummary, StoreError> {
        self.upsert_with(owner_id, records, |_, _| Ok(())).await
    }

    /// [`upsert`](Self::upsert), letting `extra` add writes that depend on
    /// the summary to the same atomic batch.
    #[instrument(skip(self, records, extra), fields(owner_id = %owner_id, count = records.len()))]
    pub async fn upsert_with<F>(
        &self,
        owner_id: &str,
        records: &[TransactionRecord],
        extra: F,
    ) -> Result<UpsertSummary, StoreError>
    where
        F: FnOnce(&UpsertSummary, &mut WriteBatch) -> Result<(), StoreError> + Send,
    {
        let now = bson::to_bson(&Utc::now())?;
        let mut batch = WriteBatch::new();
        let mut summary = UpsertSummary::default();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut periods: BTreeSet<String> = BTreeSet::new();

        for record in records {
            if !seen.insert(record.source_id.as_str()) {
                summary.modified += 1;
                continue;
            }

            let period = record.period();
            let path = Self::bucket(owner_id, &period);
            periods.insert(period);

            match self.store.get(&path, &record.source_id).await? {
                Some(_) => {
                    batch.update(&path, &record.source_id, doc! { "updated_at": now.clone() });
                    summary.modified += 1;
                }
                None => {
                    let mut document = bson::to_document(record)?;
                    document.insert("created_at", now.clone());
                    document.insert("updated_at", now.clone());
                    batch.set(&path, &record.source_id, document);
                    summary.added += 1;
                }
            }
        }

        let periods_path = Self::periods_path(owner_id);
        for period in periods {
            batch.set(
                &periods_path,
                period.clone(),
                doc! { "period": period, "updated_at": now.clone() },
            );
        }

        extra(&summary, &mut batch)?;

        let ops = batch.len();
        self.store.commit(batch).await?;

        metrics::counter!("ingestion_transactions_added_total").increment(summary.added as u64);
        metrics::counter!("ingestion_transactions_modified_total")
            .increment(summary.modified as u64);
        info!(
            added = summary.added,
            modified = summary.modified,
            ops,
            "Transaction batch committed"
        );
        Ok(summary)
    }

    /// Periods with data for `owner_id`, newest first.
    pub async fn periods(&self, owner_id: &str) -> Result<Vec<String>, StoreError> {
        let spec = QuerySpec::all().order_by("period", SortOrder::Descending);
        let docs = self.store.query(&Self::periods_path(owner_id), &spec).await?;
        Ok(docs
            .iter()
            .filter_map(|d| d.get_str("period").ok().map(str::to_string))
            .collect())
    }

    /// Records newest first, walking period buckets until `limit` is met.
    pub async fn list(
        &self,
        owner_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let bounded = query.start.is_some() || query.end.is_some();
        let mut records: Vec<TransactionRecord> = Vec::new();

        for period in self.periods(owner_id).await? {
            if !query.covers_period(&period) {
                continue;
            }
            let remaining = match query.limit {
                Some(limit) if records.len() >= limit => break,
                Some(limit) => Some(limit - records.len()),
                None => None,
            };

            let mut spec = QuerySpec::all()
                .order_by("date", SortOrder::Descending)
                .then_by("statement_line", SortOrder::Descending)
                .then_by("source_id", SortOrder::Ascending);
            if let (Some(remaining), false) = (remaining, bounded) {
                spec = spec.limit(remaining);
            }

            let docs = self
                .store
                .query(&Self::bucket(owner_id, &period), &spec)
                .await?;
            for document in docs {
                let record: TransactionRecord = bson::from_document(document)?;
                if query.covers_date(record.date) {
                    records.push(record);
                }
            }
        }

        records.sort_by(TransactionRecord::newest_first);
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}
