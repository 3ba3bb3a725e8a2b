use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::ingest::{parse_statement, to_record, Classifier, ParseError};
use crate::models::{BalanceSnapshot, IngestionTask, JobUpdate};
use crate::queue::{Retry, TaskHandler};
use crate::services::{
    CacheInvalidator, JobError, JobLedger, OwnerRepository, TransactionRepository, UpsertSummary,
};
use crate::store::{DocumentStore, StoreError};

/// Why a pipeline run stopped early.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file itself is bad. Retrying cannot help.
    #[error(transparent)]
    Content(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The job vanished or was already settled by an earlier delivery.
    #[error(transparent)]
    Abandoned(JobError),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}

impl From<JobError> for PipelineError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Store(e) => Self::Store(e),
            other => Self::Abandoned(other),
        }
    }
}

/// Queue handler that turns one uploaded statement into stored records.
///
/// Content failures and the last permitted transient failure are recorded on
/// the job and acknowledged. Earlier transient failures ask for redelivery.
#[derive(Clone)]
pub struct IngestionWorker {
    id: usize,
    ledger: JobLedger,
    transactions: TransactionRepository,
    owners: OwnerRepository,
    invalidator: CacheInvalidator,
    classifier: Arc<dyn Classifier>,
    max_deliveries: u32,
}

impl IngestionWorker {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        invalidator: CacheInvalidator,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            id: 0,
            ledger: JobLedger::new(store.clone()),
            transactions: TransactionRepository::new(store.clone()),
            owners: OwnerRepository::new(store),
            invalidator,
            classifier,
            max_deliveries: 5,
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// Must match the queue's delivery cap so the last attempt is recorded
    /// as `failed` rather than dead-lettered.
    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    async fn run(&self, task: &IngestionTask) -> Result<UpsertSummary, PipelineError> {
        let job_id = task.job_id.as_str();
        let owner_id = task.owner_id.as_str();

        let job = self
            .ledger
            .get(job_id)
            .await?
            .ok_or_else(|| PipelineError::Abandoned(JobError::NotFound(job_id.to_string())))?;
        if job.status.is_terminal() {
            return Err(PipelineError::Abandoned(JobError::AlreadyTerminal {
                job_id: job_id.to_string(),
                status: job.status,
            }));
        }

        metrics::counter!("ingestion_jobs_started_total").increment(1);
        self.ledger.advance(job_id, JobUpdate::processing(10)).await?;

        let statement = parse_statement(&task.raw_content, task.format)?;
        let total = statement.rows.len() as u32;
        if statement.skipped > 0 {
            warn!(job_id = %job_id, skipped = statement.skipped, "Skipped unreadable statement lines");
        }
        self.ledger
            .advance(job_id, JobUpdate::processing(30).with_total(total))
            .await?;

        let snapshot = statement.latest().and_then(|row| {
            row.balance.map(|balance| BalanceSnapshot {
                balance,
                as_of: row.date,
            })
        });
        if let Some(snapshot) = &snapshot {
            if !self.owners.record_balance_if_newer(owner_id, snapshot).await? {
                debug!(job_id = %job_id, as_of = %snapshot.as_of, "Statement balance is stale, ignored");
            }
        }
        self.ledger.advance(job_id, JobUpdate::processing(50)).await?;

        let records: Vec<_> = statement
            .rows
            .iter()
            .enumerate()
            .map(|(line, row)| to_record(owner_id, row, self.classifier.as_ref()).at_line(line as u32))
            .collect();
        self.ledger.advance(job_id, JobUpdate::processing(70)).await?;

        // A redelivery after the batch landed reports the first commit's counts.
        let summary = match (job.added_transactions, job.modified_transactions) {
            (Some(added), Some(modified)) => {
                debug!(job_id = %job_id, "Records already committed by an earlier delivery");
                UpsertSummary { added, modified }
            }
            _ => {
                self.transactions
                    .upsert_with(owner_id, &records, |summary, batch| {
                        let update = JobUpdate::committed(summary.added, summary.modified);
                        self.ledger.stage(batch, job_id, &update)
                    })
                    .await?
            }
        };

        // Ahead of the final ledger write, which can fail and requeue.
        self.invalidator.transactions_changed(owner_id).await;

        let mut done = JobUpdate::completed(total, summary.added, summary.modified);
        if let Some(snapshot) = snapshot {
            done = done.with_balance(snapshot.balance, snapshot.as_of);
        }
        self.ledger.advance(job_id, done).await?;

        Ok(summary)
    }

    async fn record_failure(&self, task: &IngestionTask, failure: &PipelineError) -> Result<(), Retry> {
        match self
            .ledger
            .advance(&task.job_id, JobUpdate::failed(failure.to_string()))
            .await
        {
            Ok(()) => {
                metrics::counter!("ingestion_jobs_failed_total").increment(1);
                error!(
                    worker_id = self.id,
                    job_id = %task.job_id,
                    error = %failure,
                    "Ingestion job failed"
                );
                Ok(())
            }
            Err(JobError::Store(e)) => {
                error!(
                    worker_id = self.id,
                    job_id = %task.job_id,
                    error = %e,
                    "Could not record job failure"
                );
                Err(Retry(format!("failed to record failure: {}", e)))
            }
            Err(e) => {
                debug!(job_id = %task.job_id, error = %e, "Job settled elsewhere");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl TaskHandler<IngestionTask> for IngestionWorker {
    async fn handle(&self, task: IngestionTask, attempt: u32) -> Result<(), Retry> {
        let started = Instant::now();
        info!(
            worker_id = self.id,
            job_id = %task.job_id,
            owner_id = %task.owner_id,
            attempt,
            "Processing ingestion task"
        );

        match self.run(&task).await {
            Ok(summary) => {
                metrics::counter!("ingestion_jobs_completed_total").increment(1);
                metrics::histogram!("ingestion_job_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                info!(
                    worker_id = self.id,
                    job_id = %task.job_id,
                    added = summary.added,
                    modified = summary.modified,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Ingestion job completed"
                );
                Ok(())
            }
            Err(PipelineError::Abandoned(reason)) => {
                info!(worker_id = self.id, job_id = %task.job_id, reason = %reason, "Skipping task");
                Ok(())
            }
            Err(e) if e.is_transient() && attempt < self.max_deliveries => {
                metrics::counter!("ingestion_jobs_requeued_total").increment(1);
                warn!(
                    worker_id = self.id,
                    job_id = %task.job_id,
                    attempt,
                    error = %e,
                    "Transient failure, requesting redelivery"
                );
                Err(Retry(e.to_string()))
            }
            Err(e) => {
                metrics::histogram!("ingestion_job_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                self.record_failure(&task, &e).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;

    #[test]
    fn only_unavailable_stores_are_retried() {
        assert!(PipelineError::Store(StoreError::Unavailable("down".into())).is_transient());
        assert!(!PipelineError::Content(ParseError::NoTransactionsFound).is_transient());
        assert!(!PipelineError::from(JobError::AlreadyTerminal {
            job_id: "j".into(),
            status: JobStatus::Completed,
        })
        .is_transient());
    }

    #[test]
    fn ledger_store_errors_stay_store_errors() {
        let err = PipelineError::from(JobError::Store(StoreError::Unavailable("down".into())));
        assert!(matches!(err, PipelineError::Store(_)));
    }
}
