//! Bulk read job lifecycle
//!
//! ```text
//! CREATED -> ADDED / QUEUED -> IN PROGRESS -> COMPLETED -> download
//!                    \______________|______________ anything else -> failed
//! ```

use log::{info, log, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ExportOutcome, extract_csv};
use crate::api::CrmClient;
use crate::api::wire::BulkResponse;
use crate::clock::Clock;
use crate::config::SyncOptions;
use crate::error::{CrmError, Result};
use crate::fetch::remote_error;
use crate::http::HttpResponse;
use crate::models::{BulkJob, BulkState};

/// Drives bulk read jobs from creation to an extracted CSV
pub struct BulkExporter {
    client: Arc<CrmClient>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
}

impl BulkExporter {
    pub fn new(client: Arc<CrmClient>, clock: Arc<dyn Clock>, options: SyncOptions) -> Self {
        Self {
            client,
            clock,
            options,
        }
    }

    /// Export `module` into the archive at `destination` (must end in `.zip`)
    ///
    /// Never retries; any failure ends the export with `success: false`.
    pub fn export(&self, module: &str, destination: &Path) -> ExportOutcome {
        let mut job = None;
        match self.run(module, destination, &mut job) {
            Ok(file) => match job {
                Some(job) => {
                    info!("[BULK] Export of {} done: {}", module, file.display());
                    ExportOutcome::completed(job, file)
                }
                None => ExportOutcome::failed(None, "export finished without a job"),
            },
            Err(e) => {
                warn!("[BULK] Export of {} failed: {}", module, e);
                ExportOutcome::failed(job, e.to_string())
            }
        }
    }

    fn run(&self, module: &str, destination: &Path, slot: &mut Option<BulkJob>) -> Result<PathBuf> {
        if module.is_empty() {
            return Err(CrmError::validation("module name is required"));
        }
        validate_destination(destination)?;

        let job_id = self.create(module)?;
        info!("[BULK] Created job {} for {}", job_id, module);
        let job = slot.insert(BulkJob::new(job_id, module, destination.to_path_buf()));

        let mut checks = 0u32;
        loop {
            let state = self.status(&job.job_id)?;
            checks += 1;
            job.observe(state.clone());
            log!(
                self.options.trace_level(),
                "[BULK] Job {} is {} (check {})",
                job.job_id,
                state,
                checks
            );

            match state {
                BulkState::Completed => return self.download(&job.job_id, destination),
                pending if pending.is_pending() => {
                    if let Some(max) = self.options.max_poll_attempts
                        && checks >= max
                    {
                        return Err(CrmError::job(format!(
                            "job {} still {} after {} status checks",
                            job.job_id, pending, checks
                        )));
                    }
                    self.clock.sleep(self.options.poll_interval);
                }
                other => {
                    return Err(CrmError::job(format!(
                        "job {} ended in state {}",
                        job.job_id, other
                    )));
                }
            }
        }
    }

    /// Create a bulk read job, returning its ID
    pub fn create(&self, module: &str) -> Result<String> {
        let response = checked(self.client.create_bulk_read(module)?)?;
        let body: BulkResponse = response.json()?;
        body.data
            .first()
            .and_then(|entry| entry.job_id())
            .ok_or_else(|| CrmError::job(format!("no job id in bulk create response for {}", module)))
    }

    /// Current state of a job
    pub fn status(&self, job_id: &str) -> Result<BulkState> {
        let response = checked(self.client.bulk_read_status(job_id)?)?;
        let body: BulkResponse = response.json()?;
        body.data
            .first()
            .and_then(|entry| entry.state())
            .map(BulkState::parse)
            .ok_or_else(|| CrmError::job(format!("no state in status response for job {}", job_id)))
    }

    /// Download the result archive of a completed job and extract its CSV
    pub fn download(&self, job_id: &str, destination: &Path) -> Result<PathBuf> {
        validate_destination(destination)?;

        let response = checked(self.client.bulk_read_result(job_id)?)?;
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, &response.body)?;
        info!(
            "[BULK] Downloaded job {} ({} bytes) to {}",
            job_id,
            response.body.len(),
            destination.display()
        );

        extract_csv(destination, job_id)
    }
}

fn validate_destination(destination: &Path) -> Result<()> {
    let is_zip = destination
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return Err(CrmError::validation(format!(
            "bulk export destination must be a .zip file: {}",
            destination.display()
        )));
    }
    Ok(())
}

fn checked(response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(CrmError::Remote {
            status: response.status,
            error: remote_error(&response),
        })
    }
}
