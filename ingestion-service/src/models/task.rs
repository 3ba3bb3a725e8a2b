use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column layout of an uploaded statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementFormat {
    /// `date, description, debit, credit, balance` with no header line.
    #[default]
    DebitCredit,
    /// `date, description, amount` preceded by a header line.
    SignedAmount,
}

impl std::str::FromStr for StatementFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debit_credit" | "td" | "bank" => Ok(Self::DebitCredit),
            "signed_amount" | "generic" => Ok(Self::SignedAmount),
            _ => Err(format!("Unknown statement format: {}", s)),
        }
    }
}

/// Message body carried by the work queue, one per uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionTask {
    pub job_id: String,
    pub owner_id: String,
    pub raw_content: String,
    pub file_name: String,
    #[serde(default)]
    pub format: StatementFormat,
    pub enqueued_at: DateTime<Utc>,
}
