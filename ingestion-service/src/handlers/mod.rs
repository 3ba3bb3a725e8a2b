pub mod health;
pub mod jobs;
pub mod profile;
pub mod statements;
pub mod views;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use jobs::{get_job, list_jobs};
pub use statements::upload_statement;
