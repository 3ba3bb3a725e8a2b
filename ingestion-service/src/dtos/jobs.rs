use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Job, JobStatus};

/// Accepted-upload body: `{jobId, status}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub job_id: String,
    pub status: JobStatus,
}

impl EnqueueResponse {
    pub fn pending(job_id: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: String,
    pub owner_id: String,
    pub source_file_name: String,
    pub status: JobStatus,
    pub progress: u8,
    pub total_transactions: Option<u32>,
    pub added_transactions: Option<u32>,
    pub modified_transactions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            owner_id: job.owner_id,
            source_file_name: job.source_file_name,
            status: job.status,
            progress: job.progress,
            total_transactions: job.total_transactions,
            added_transactions: job.added_transactions,
            modified_transactions: job.modified_transactions,
            balance: job.balance,
            balance_updated: job.balance_updated.map(|d| d.format("%Y-%m-%d").to_string()),
            error: job.error,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct JobListParams {
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_job_limit")]
    pub limit: usize,
}

fn default_job_limit() -> usize {
    10
}
