use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::IngestionWorker;
use crate::models::IngestionTask;
use crate::queue::{QueueError, WorkQueue};

/// A set of sequential consumers sharing one shutdown signal.
///
/// Each consumer owns its queue handle, so a blocking receive on one never
/// stalls another, and each has its own in-flight list to recover.
pub struct WorkerPool {
    worker: IngestionWorker,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker: IngestionWorker, shutdown: CancellationToken) -> Self {
        Self {
            worker,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Requeue anything this consumer left unacknowledged, then start it.
    pub async fn spawn_consumer(&mut self, queue: WorkQueue<IngestionTask>) -> Result<(), QueueError> {
        let worker_id = self.handles.len();
        let recovered = queue.recover_in_flight().await?;
        if recovered > 0 {
            tracing::warn!(worker_id, recovered, "Requeued unacknowledged deliveries");
        }

        let worker = self.worker.clone().with_id(worker_id);
        let shutdown = self.shutdown.clone();
        self.handles.push(tokio::spawn(async move {
            tracing::info!(worker_id = worker.id(), "Consumer started");
            queue.consume(&worker, shutdown).await;
        }));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn shutdown(&self) {
        tracing::info!(consumers = self.handles.len(), "Initiating worker pool shutdown");
        self.shutdown.cancel();
    }

    /// Wait for every consumer to finish its current task and stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Consumer task panicked");
            }
        }
    }
}
