//! Domain models for ingestion-service.

mod job;
mod owner;
mod profile;
mod task;
mod transaction;
mod views;

pub use job::{Job, JobStatus, JobUpdate};
pub use owner::BalanceSnapshot;
pub use profile::{Insight, ProfileEntry, INSIGHT_TYPES};
pub use task::{IngestionTask, StatementFormat};
pub use transaction::{EntryKind, FinanceCategory, TransactionRecord};
pub use views::{DashboardView, EntryView, InsightView, InsightsView, TransactionsView};
