pub mod invalidation;
pub mod jobs;
pub mod metrics;
pub mod owners;
pub mod producer;
pub mod profile;
pub mod transactions;
pub mod views;

pub use invalidation::CacheInvalidator;
pub use jobs::{JobError, JobLedger};
pub use owners::OwnerRepository;
pub use producer::{IngestionProducer, ProducerError};
pub use profile::ProfileService;
pub use transactions::{TransactionQuery, TransactionRepository, UpsertSummary};
pub use views::ViewService;
