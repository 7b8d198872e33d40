//! Insert and update responses

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::RecordId;

/// Per-record outcome of an insert or update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOutcome {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    /// ID of the written record (present for successful writes)
    pub fn id(&self) -> Option<RecordId> {
        self.details
            .get("id")
            .and_then(Value::as_str)
            .map(RecordId::new)
    }
}

/// Outcome of an insert/update request, possibly covering several batches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    /// HTTP status of the last request (first failing one when a batch failed)
    pub status_code: u16,
    pub outcomes: Vec<WriteOutcome>,
}

impl WriteResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code) && self.outcomes.iter().all(WriteOutcome::is_success)
    }

    /// ID of the first written record
    pub fn first_id(&self) -> Option<RecordId> {
        self.outcomes.iter().find_map(WriteOutcome::id)
    }

    /// Fold another batch result into this one
    pub fn merge(&mut self, other: WriteResult) {
        if self.outcomes.is_empty() || (200..300).contains(&self.status_code) {
            self.status_code = other.status_code;
        }
        self.outcomes.extend(other.outcomes);
    }
}
