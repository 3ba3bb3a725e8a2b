pub mod jobs;
pub mod profile;
pub mod views;

pub use jobs::{EnqueueResponse, JobListParams, JobListResponse, JobResponse};
pub use profile::{EntryRequest, EntryResponse, InsightRequest, InsightResponse};
pub use views::{InvalidateResponse, ViewParams};
