use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Insight, ProfileEntry};

#[derive(Debug, Deserialize)]
pub struct EntryRequest {
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntryResponse {
    pub id: String,
    pub payload: serde_json::Value,
    pub updated_at: String,
}

impl From<ProfileEntry> for EntryResponse {
    fn from(entry: ProfileEntry) -> Self {
        Self {
            id: entry.id,
            payload: entry.payload,
            updated_at: entry.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct InsightRequest {
    #[validate(length(min = 1, message = "analysis_type cannot be empty"))]
    pub analysis_type: String,
    pub content: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InsightResponse {
    pub id: String,
    pub analysis_type: String,
    pub content: serde_json::Value,
    pub created_at: String,
}

impl From<Insight> for InsightResponse {
    fn from(insight: Insight) -> Self {
        Self {
            id: insight.id,
            analysis_type: insight.analysis_type,
            content: insight.content,
            created_at: insight.created_at.to_rfc3339(),
        }
    }
}
