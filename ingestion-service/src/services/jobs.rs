//! Job ledger: the durable state machine behind every upload.
//!
//! `pending -> processing -> {completed | failed}`. Terminal jobs are never
//! written again; the guard is enforced by the store, not by a read-check.

use chrono::Utc;
use mongodb::bson::{self, Bson};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

use crate::models::{Job, JobStatus, JobUpdate};
use crate::store::{CollectionPath, DocumentStore, QuerySpec, SortOrder, StoreError, WriteBatch};
use service_core::error::AppError;

pub const JOBS_COLLECTION: &str = "jobs";

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {0} not found")]
    NotFound(String),

    #[error("Job {job_id} is already {status}")]
    AlreadyTerminal { job_id: String, status: JobStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl JobError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(_) => AppError::NotFound(anyhow::Error::new(err)),
            JobError::AlreadyTerminal { .. } => AppError::Conflict(anyhow::Error::new(err)),
            JobError::Store(e) => e.into(),
        }
    }
}

#[derive(Clone)]
pub struct JobLedger {
    store: Arc<dyn DocumentStore>,
}

impl JobLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn path() -> CollectionPath {
        CollectionPath::root(JOBS_COLLECTION)
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn create(
        &self,
        job_id: &str,
        owner_id: &str,
        source_file_name: &str,
    ) -> Result<Job, JobError> {
        let job = Job::pending(
            job_id.to_string(),
            owner_id.to_string(),
            source_file_name.to_string(),
        );
        let document = bson::to_document(&job).map_err(StoreError::from)?;
        self.store.set(&Self::path(), job_id, document).await?;

        info!(owner_id = %owner_id, "Job created");
        Ok(job)
    }

    /// Apply `update` unless the job already reached a terminal status.
    pub async fn advance(&self, job_id: &str, update: JobUpdate) -> Result<(), JobError> {
        let fields = update
            .to_document(Utc::now())
            .map_err(StoreError::from)?;
        let allowed: Vec<Bson> = JobStatus::ACTIVE.iter().map(|s| Bson::from(*s)).collect();

        let applied = self
            .store
            .update_if(&Self::path(), job_id, "status", &allowed, fields)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => JobError::NotFound(job_id.to_string()),
                other => JobError::Store(other),
            })?;

        if applied {
            tracing::debug!(job_id = %job_id, status = ?update.status, progress = ?update.progress, "Job advanced");
            return Ok(());
        }

        let status = self
            .get(job_id)
            .await?
            .map(|job| job.status)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Err(JobError::AlreadyTerminal {
            job_id: job_id.to_string(),
            status,
        })
    }

    /// Queue `update` into `batch` so it commits together with other writes.
    /// Unlike [`advance`](Self::advance) this is unguarded; callers must hold
    /// the job in an active status.
    pub fn stage(&self, batch: &mut WriteBatch, job_id: &str, update: &JobUpdate) -> Result<(), StoreError> {
        batch.update(&Self::path(), job_id, update.to_document(Utc::now())?);
        Ok(())
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, JobError> {
        match self.store.get(&Self::path(), job_id).await? {
            Some(document) => Ok(Some(
                bson::from_document(document).map_err(StoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    /// Most recent first.
    pub async fn list_for_owner(&self, owner_id: &str, limit: usize) -> Result<Vec<Job>, JobError> {
        let spec = QuerySpec::all()
            .where_eq("owner_id", owner_id)
            .order_by("created_at", SortOrder::Descending)
            .limit(limit);

        self.store
            .query(&Self::path(), &spec)
            .await?
            .into_iter()
            .map(|document| {
                bson::from_document(document).map_err(|e| JobError::from(StoreError::from(e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger() -> JobLedger {
        JobLedger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn new_job_is_pending() {
        let ledger = ledger();
        ledger.create("j1", "u1", "march.csv").await.unwrap();

        let job = ledger.get("j1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.source_file_name, "march.csv");
    }

    #[tokio::test]
    async fn terminal_jobs_reject_further_updates() {
        let ledger = ledger();
        ledger.create("j1", "u1", "march.csv").await.unwrap();
        ledger.advance("j1", JobUpdate::processing(10)).await.unwrap();
        ledger.advance("j1", JobUpdate::completed(3, 3, 0)).await.unwrap();

        let err = ledger
            .advance("j1", JobUpdate::failed("late failure"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::AlreadyTerminal { status: JobStatus::Completed, .. }
        ));

        let job = ledger.get("j1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.error, None);
    }

    #[tokio::test]
    async fn advancing_unknown_job_is_not_found() {
        let err = ledger()
            .advance("nope", JobUpdate::processing(10))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn listing_is_owner_scoped_and_recent_first() {
        let ledger = ledger();
        ledger.create("a", "u1", "a.csv").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        ledger.create("b", "u2", "b.csv").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        ledger.create("c", "u1", "c.csv").await.unwrap();

        let jobs = ledger.list_for_owner("u1", 10).await.unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }
}
