//! Task result records produced by firings.

use serde::{Deserialize, Serialize};

use crate::id::{generate_result_id, now_ms};

/// Outcome status of a single firing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Success,
    Failed,
}

impl ResultStatus {
    /// String form used in the store index
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Success => "success",
            ResultStatus::Failed => "failed",
        }
    }
}

/// The recorded outcome of one trigger firing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: String,
    pub trigger_id: String,
    /// Epoch milliseconds when the firing finished
    pub timestamp: i64,
    pub status: ResultStatus,
    pub output: String,
    pub cost_usd: f64,
}

impl TaskResult {
    /// Record a successful firing
    pub fn success(trigger_id: &str, output: &str, cost_usd: f64) -> Self {
        Self {
            id: generate_result_id(trigger_id),
            trigger_id: trigger_id.to_string(),
            timestamp: now_ms(),
            status: ResultStatus::Success,
            output: output.to_string(),
            cost_usd,
        }
    }

    /// Record a failed firing with the error text as output
    pub fn failure(trigger_id: &str, error: &str) -> Self {
        Self {
            id: generate_result_id(trigger_id),
            trigger_id: trigger_id.to_string(),
            timestamp: now_ms(),
            status: ResultStatus::Failed,
            output: error.to_string(),
            cost_usd: 0.0,
        }
    }

    /// Output truncated for list views, on a char boundary
    pub fn truncated_output(&self, max_chars: usize) -> String {
        if self.output.chars().count() <= max_chars {
            return self.output.clone();
        }
        let truncated: String = self.output.chars().take(max_chars).collect();
        format!("{}…", truncated)
    }
}
