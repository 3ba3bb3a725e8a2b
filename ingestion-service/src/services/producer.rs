use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::jobs::{JobError, JobLedger};
use crate::models::{IngestionTask, Job, JobUpdate, StatementFormat};
use crate::queue::{QueueError, WorkQueue};
use service_core::error::AppError;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Failed to enqueue job {job_id}: {source}")]
    Enqueue {
        job_id: String,
        #[source]
        source: QueueError,
    },
}

impl From<ProducerError> for AppError {
    fn from(err: ProducerError) -> Self {
        match err {
            ProducerError::Job(e) => e.into(),
            ProducerError::Enqueue { .. } => AppError::ServiceUnavailable(err.to_string()),
        }
    }
}

/// Upload side of the pipeline: records the job, then hands the file to the
/// work queue. Also answers job polling.
#[derive(Clone)]
pub struct IngestionProducer {
    ledger: JobLedger,
    queue: WorkQueue<IngestionTask>,
}

impl IngestionProducer {
    pub fn new(ledger: JobLedger, queue: WorkQueue<IngestionTask>) -> Self {
        Self { ledger, queue }
    }

    /// Returns the new job id as soon as the task is queued.
    ///
    /// The job is written before publishing so a fast worker always finds it.
    /// If the publish fails the job is marked `failed` so pollers do not wait
    /// on a task that will never run.
    #[instrument(skip(self, raw_content), fields(owner_id = %owner_id, bytes = raw_content.len()))]
    pub async fn enqueue_ingestion(
        &self,
        owner_id: &str,
        file_name: &str,
        raw_content: String,
        format: StatementFormat,
    ) -> Result<String, ProducerError> {
        let job_id = Uuid::new_v4().to_string();
        self.ledger.create(&job_id, owner_id, file_name).await?;

        let task = IngestionTask {
            job_id: job_id.clone(),
            owner_id: owner_id.to_string(),
            raw_content,
            file_name: file_name.to_string(),
            format,
            enqueued_at: Utc::now(),
        };

        if let Err(source) = self.queue.publish(&task).await {
            error!(job_id = %job_id, error = %source, "Failed to publish ingestion task");
            if let Err(e) = self
                .ledger
                .advance(&job_id, JobUpdate::failed("Failed to queue statement for processing"))
                .await
            {
                error!(job_id = %job_id, error = %e, "Failed to mark unqueued job as failed");
            }
            return Err(ProducerError::Enqueue { job_id, source });
        }

        metrics::counter!("ingestion_jobs_enqueued_total").increment(1);
        info!(job_id = %job_id, file_name = %file_name, "Ingestion job enqueued");
        Ok(job_id)
    }

    /// Jobs belonging to another owner are reported as absent.
    pub async fn get_job_status(&self, owner_id: &str, job_id: &str) -> Result<Option<Job>, JobError> {
        Ok(self
            .ledger
            .get(job_id)
            .await?
            .filter(|job| job.owner_id == owner_id))
    }

    pub async fn list_jobs(&self, owner_id: &str, limit: usize) -> Result<Vec<Job>, JobError> {
        self.ledger.list_for_owner(owner_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use crate::queue::{ConsumerSettings, MemoryQueue};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn producer() -> (IngestionProducer, Arc<MemoryQueue>) {
        let transport = Arc::new(MemoryQueue::new());
        let queue = WorkQueue::new(transport.clone(), ConsumerSettings::default());
        let ledger = JobLedger::new(Arc::new(MemoryStore::new()));
        (IngestionProducer::new(ledger, queue), transport)
    }

    #[tokio::test]
    async fn enqueue_creates_pending_job_and_one_task() {
        let (producer, transport) = producer();

        let job_id = producer
            .enqueue_ingestion("u1", "jan.csv", "01/02/2024,COFFEE,4.50,,".into(), StatementFormat::DebitCredit)
            .await
            .unwrap();

        let job = producer.get_job_status("u1", &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.source_file_name, "jan.csv");
        assert_eq!(transport.ready_len(), 1);
    }

    #[tokio::test]
    async fn other_owners_cannot_see_a_job() {
        let (producer, _) = producer();
        let job_id = producer
            .enqueue_ingestion("u1", "jan.csv", "x".into(), StatementFormat::default())
            .await
            .unwrap();

        assert!(producer.get_job_status("u2", &job_id).await.unwrap().is_none());
        assert!(producer.list_jobs("u2", 10).await.unwrap().is_empty());
        assert_eq!(producer.list_jobs("u1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_marks_job_failed() {
        let (producer, transport) = producer();
        transport.set_available(false);

        let err = producer
            .enqueue_ingestion("u1", "jan.csv", "x".into(), StatementFormat::default())
            .await
            .unwrap_err();
        let ProducerError::Enqueue { job_id, .. } = err else {
            panic!("expected enqueue error, got {err:?}");
        };

        let job = producer.get_job_status("u1", &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
    }
}
