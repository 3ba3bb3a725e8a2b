mod ingestion;
mod pool;

pub use ingestion::{IngestionWorker, PipelineError};
pub use pool::WorkerPool;
