mod command;
mod engine;
mod outputs;
mod runner;
mod workdir;

pub use command::{TagContext, ToolCommand, build_command, expand_tags};
pub use engine::{Engine, ExecutionRequest, ExecutionSummary, ItemOutcome};
pub use outputs::{ArchiveReport, archive_outputs, create_result_dir};
pub use runner::{ProcessOutcome, run_command};
pub use workdir::{
    StagedInputs, create_work_dir, create_output_dirs, files_in_dir, stage_work_dir,
};

use anyhow::{Context, Result};
use std::path::Path;

/// Copy a file, creating the destination's parent directories
pub(crate) fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    std::fs::copy(source, destination).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    Ok(())
}

/// Recursively copy a directory
pub(crate) fn copy_dir_all(source: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination)
        .with_context(|| format!("failed to create directory: {}", destination.display()))?;
    let entries = std::fs::read_dir(source)
        .with_context(|| format!("failed to read directory: {}", source.display()))?;
    for entry in entries {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            copy_file(&entry.path(), &target)?;
        }
    }
    Ok(())
}
