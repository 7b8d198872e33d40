//! Bulk export job model

use std::path::PathBuf;

/// Lifecycle state of a bulk export job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkState {
    /// Created locally, status not yet observed
    Created,
    Added,
    Queued,
    InProgress,
    Completed,
    /// Anything the engine does not know; terminal failure
    Unrecognized(String),
}

impl BulkState {
    /// Parse the state string reported by the bulk status endpoint
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ADDED" => BulkState::Added,
            "QUEUED" => BulkState::Queued,
            "IN PROGRESS" | "IN_PROGRESS" => BulkState::InProgress,
            "COMPLETED" => BulkState::Completed,
            _ => BulkState::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BulkState::Created => "CREATED",
            BulkState::Added => "ADDED",
            BulkState::Queued => "QUEUED",
            BulkState::InProgress => "IN PROGRESS",
            BulkState::Completed => "COMPLETED",
            BulkState::Unrecognized(raw) => raw,
        }
    }

    /// Reported by the server as still running; keep polling
    ///
    /// `Created` is the local state before the first status check, so a
    /// server never reports it and it is not in this set.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            BulkState::Added | BulkState::Queued | BulkState::InProgress
        )
    }
}

impl std::fmt::Display for BulkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bulk export, owned by the polling loop that created it
#[derive(Debug, Clone, PartialEq)]
pub struct BulkJob {
    pub job_id: String,
    pub module: String,
    pub state: BulkState,
    /// Archive path the result is downloaded to (must end in `.zip`)
    pub destination: PathBuf,
}

impl BulkJob {
    pub fn new(job_id: impl Into<String>, module: impl Into<String>, destination: PathBuf) -> Self {
        Self {
            job_id: job_id.into(),
            module: module.into(),
            state: BulkState::Created,
            destination,
        }
    }

    /// Transition to a newly observed state
    pub fn observe(&mut self, state: BulkState) {
        self.state = state;
    }
}
