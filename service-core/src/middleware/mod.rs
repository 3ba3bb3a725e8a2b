mod metrics;
mod request_id;

pub use metrics::http_metrics;
pub use request_id::{request_id, REQUEST_ID_HEADER};
