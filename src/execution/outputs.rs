use anyhow::Context;
use chrono::Local;
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{copy_dir_all, copy_file};
use crate::error::ToolboxError;
use crate::spec::{ToolSpecification, has_wildcards, is_directory_entry};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H.%M.%S";

/// What was archived after a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub result_dir: PathBuf,
    /// Archived files and directories, inside `result_dir`
    pub copied: Vec<PathBuf>,
    /// Plain output entries that were not produced
    pub missing: Vec<String>,
}

/// Create a timestamped directory under `output_root`
pub fn create_result_dir(output_root: &Path) -> Result<PathBuf, ToolboxError> {
    let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let mut candidate = output_root.join(&stamp);
    let mut n = 1;
    while candidate.exists() {
        candidate = output_root.join(format!("{}-{}", stamp, n));
        n += 1;
    }
    std::fs::create_dir_all(&candidate)
        .with_context(|| format!("failed to create result directory: {}", candidate.display()))?;
    Ok(candidate)
}

/// Copy the specification's output files from `work_dir` to `result_dir`.
///
/// Wildcard entries without matches leave an empty directory; plain entries
/// without a file are listed in [`ArchiveReport::missing`].
pub fn archive_outputs(
    spec: &ToolSpecification,
    work_dir: &Path,
    result_dir: &Path,
) -> Result<ArchiveReport, ToolboxError> {
    let mut report = ArchiveReport {
        result_dir: result_dir.to_path_buf(),
        copied: Vec::new(),
        missing: Vec::new(),
    };

    for entry in &spec.outputfiles {
        if has_wildcards(entry) {
            archive_pattern(entry, work_dir, result_dir, &mut report)?;
            continue;
        }
        let source = work_dir.join(entry);
        let destination = result_dir.join(entry);
        if source.is_dir() {
            copy_dir_all(&source, &destination)?;
            report.copied.push(destination);
        } else if source.is_file() && !is_directory_entry(entry) {
            copy_file(&source, &destination)?;
            report.copied.push(destination);
        } else {
            warn!(entry = %entry, "output file not found");
            report.missing.push(entry.clone());
        }
    }

    debug!(
        result_dir = %result_dir.display(),
        copied = report.copied.len(),
        missing = report.missing.len(),
        "archived outputs"
    );
    Ok(report)
}

fn archive_pattern(
    entry: &str,
    work_dir: &Path,
    result_dir: &Path,
    report: &mut ArchiveReport,
) -> Result<(), ToolboxError> {
    if let Some(parent) = Path::new(entry).parent() {
        let dir = result_dir.join(parent);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory: {}", dir.display()))?;
    }

    let base = glob::Pattern::escape(&work_dir.to_string_lossy());
    let full_pattern = format!("{}/{}", base.trim_end_matches('/'), entry);
    let entries = glob(&full_pattern).map_err(|e| {
        ToolboxError::Staging(format!("invalid output pattern '{}': {}", entry, e))
    })?;

    for path in entries {
        let path = match path {
            Ok(path) => path,
            Err(e) => {
                debug!("glob entry error: {}", e);
                continue;
            }
        };
        let Ok(relative) = path.strip_prefix(work_dir) else {
            continue;
        };
        let destination = result_dir.join(relative);
        if path.is_dir() {
            copy_dir_all(&path, &destination)?;
        } else {
            copy_file(&path, &destination)?;
        }
        report.copied.push(destination);
    }
    Ok(())
}
