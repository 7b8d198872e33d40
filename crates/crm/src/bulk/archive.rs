//! Result archive extraction

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{CrmError, Result};

/// Extract the CSV held by a bulk result archive
///
/// The file is written next to the archive as `{job_id}.csv`, whatever name
/// it has inside the archive.
pub fn extract_csv(archive_path: &Path, job_id: &str) -> Result<PathBuf> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)
        .map_err(|e| CrmError::job(format!("{} is not a readable archive: {}", archive_path.display(), e)))?;

    let index = (0..archive.len())
        .find(|&i| {
            archive
                .by_index(i)
                .is_ok_and(|entry| entry.is_file() && entry.name().to_ascii_lowercase().ends_with(".csv"))
        })
        .ok_or_else(|| CrmError::job(format!("no CSV file in {}", archive_path.display())))?;

    let mut entry = archive
        .by_index(index)
        .map_err(|e| CrmError::job(format!("failed to read archive entry: {}", e)))?;

    let target = archive_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{}.csv", file_stem(job_id)));
    let temp_path = target.with_extension("csv.tmp");
    let mut out = File::create(&temp_path)?;
    io::copy(&mut entry, &mut out)?;
    fs::rename(&temp_path, &target)?;

    Ok(target)
}

/// Job ID as a file name that stays inside the archive's directory
fn file_stem(job_id: &str) -> String {
    let stem: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() { "export".to_string() } else { stem }
}
