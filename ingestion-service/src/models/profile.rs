use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Analysis types surfaced by the insights view.
pub const INSIGHT_TYPES: [&str; 3] = ["quick_insight", "spending_analysis", "savings_advice"];

/// Goal or income source. The payload is owned by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub id: String,
    pub payload: serde_json::Value,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub analysis_type: String,
    pub content: serde_json::Value,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}
