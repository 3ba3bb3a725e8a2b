use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::{self, doc, Bson, Document};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Statuses a job may still leave.
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Processing];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<JobStatus> for Bson {
    fn from(status: JobStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}

/// Durable record of one uploaded statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub owner_id: String,
    pub source_file_name: String,
    pub status: JobStatus,
    pub progress: u8,
    pub total_transactions: Option<u32>,
    pub added_transactions: Option<u32>,
    pub modified_transactions: Option<u32>,
    pub balance: Option<Decimal>,
    pub balance_updated: Option<NaiveDate>,
    pub error: Option<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn pending(job_id: String, owner_id: String, source_file_name: String) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            owner_id,
            source_file_name,
            status: JobStatus::Pending,
            progress: 0,
            total_transactions: None,
            added_transactions: None,
            modified_transactions: None,
            balance: None,
            balance_updated: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial job update. Unset fields are left untouched; `updated_at` is
/// always stamped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub total_transactions: Option<u32>,
    pub added_transactions: Option<u32>,
    pub modified_transactions: Option<u32>,
    pub balance: Option<Decimal>,
    pub balance_updated: Option<NaiveDate>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn processing(progress: u8) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(progress.min(100)),
            ..Default::default()
        }
    }

    pub fn with_total(mut self, total: u32) -> Self {
        self.total_transactions = Some(total);
        self
    }

    /// Progress after the record batch landed. Written in the same batch as
    /// the records, so the counts survive a later failed ledger write.
    pub fn committed(added: u32, modified: u32) -> Self {
        Self {
            added_transactions: Some(added),
            modified_transactions: Some(modified),
            ..Self::processing(90)
        }
    }

    pub fn completed(total: u32, added: u32, modified: u32) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            total_transactions: Some(total),
            added_transactions: Some(added),
            modified_transactions: Some(modified),
            ..Default::default()
        }
    }

    pub fn with_balance(mut self, balance: Decimal, as_of: NaiveDate) -> Self {
        self.balance = Some(balance);
        self.balance_updated = Some(as_of);
        self
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Render as the `$set` body for the store.
    pub fn to_document(&self, now: DateTime<Utc>) -> Result<Document, bson::ser::Error> {
        let mut fields = doc! { "updated_at": Bson::DateTime(bson::DateTime::from_chrono(now)) };
        if let Some(status) = self.status {
            fields.insert("status", status);
        }
        if let Some(progress) = self.progress {
            fields.insert("progress", progress as i32);
        }
        if let Some(total) = self.total_transactions {
            fields.insert("total_transactions", total as i64);
        }
        if let Some(added) = self.added_transactions {
            fields.insert("added_transactions", added as i64);
        }
        if let Some(modified) = self.modified_transactions {
            fields.insert("modified_transactions", modified as i64);
        }
        if let Some(balance) = &self.balance {
            fields.insert("balance", bson::to_bson(balance)?);
        }
        if let Some(as_of) = &self.balance_updated {
            fields.insert("balance_updated", bson::to_bson(as_of)?);
        }
        if let Some(error) = &self.error {
            fields.insert("error", error.as_str());
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn update_document_carries_only_set_fields() {
        let now = Utc::now();
        let fields = JobUpdate::processing(30).with_total(12).to_document(now).unwrap();

        assert_eq!(fields.get_str("status").unwrap(), "processing");
        assert_eq!(fields.get_i32("progress").unwrap(), 30);
        assert_eq!(fields.get_i64("total_transactions").unwrap(), 12);
        assert!(fields.get("error").is_none());
        assert!(fields.get_datetime("updated_at").is_ok());
    }

    #[test]
    fn committed_update_records_counts_while_processing() {
        let fields = JobUpdate::committed(3, 1).to_document(Utc::now()).unwrap();

        assert_eq!(fields.get_str("status").unwrap(), "processing");
        assert_eq!(fields.get_i32("progress").unwrap(), 90);
        assert_eq!(fields.get_i64("added_transactions").unwrap(), 3);
        assert_eq!(fields.get_i64("modified_transactions").unwrap(), 1);
        assert!(fields.get("total_transactions").is_none());
    }

    #[test]
    fn job_round_trips_through_bson_with_update_applied() {
        let job = Job::pending("job-1".into(), "owner-1".into(), "march.csv".into());
        let mut stored = bson::to_document(&job).unwrap();
        let update = JobUpdate::completed(3, 2, 1)
            .with_balance(dec("1234.56"), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .to_document(Utc::now())
            .unwrap();
        for (key, value) in update {
            stored.insert(key, value);
        }

        let loaded: Job = bson::from_document(stored).unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.progress, 100);
        assert_eq!(loaded.added_transactions, Some(2));
        assert_eq!(loaded.balance, Some(dec("1234.56")));
        assert_eq!(
            loaded.balance_updated,
            NaiveDate::from_ymd_opt(2024, 3, 31)
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
