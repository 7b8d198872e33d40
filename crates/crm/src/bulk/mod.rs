//! Bulk export
//!
//! A bulk read job exports a whole module server-side. The exporter creates
//! the job, polls its state until it completes, then downloads the result
//! archive and extracts the CSV it holds.

mod archive;
mod export;

pub use archive::extract_csv;
pub use export::BulkExporter;

use std::path::PathBuf;

use crate::models::BulkJob;

/// Result of one export
///
/// Failures are reported here rather than as an error, together with the
/// job as last observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub success: bool,
    pub job: Option<BulkJob>,
    /// Extracted CSV file
    pub file: Option<PathBuf>,
    pub error: Option<String>,
}

impl ExportOutcome {
    pub(crate) fn completed(job: BulkJob, file: PathBuf) -> Self {
        Self {
            success: true,
            job: Some(job),
            file: Some(file),
            error: None,
        }
    }

    pub(crate) fn failed(job: Option<BulkJob>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            job,
            file: None,
            error: Some(error.into()),
        }
    }
}
