use anyhow::Context;
use glob::{MatchOptions, Pattern};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use super::{copy_dir_all, copy_file};
use crate::error::ToolboxError;
use crate::project::shorten;
use crate::spec::{ToolSpecification, has_wildcards, is_directory_entry};

/// Files copied into a work directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedInputs {
    /// Required input files, absolute paths inside the work directory
    pub required: Vec<PathBuf>,
    /// Optional input files, absolute paths inside the work directory
    pub optional: Vec<PathBuf>,
}

/// Create a fresh scratch directory for a specification under `work_root`
pub fn create_work_dir(spec: &ToolSpecification, work_root: &Path) -> Result<PathBuf, ToolboxError> {
    let name = format!("{}__{}", shorten(&spec.name), Uuid::new_v4().simple());
    let work_dir = work_root.join(name);
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("failed to create work directory: {}", work_dir.display()))?;
    debug!(path = %work_dir.display(), "created work directory");
    Ok(work_dir)
}

/// Regular files directly inside `dir`, sorted
pub fn files_in_dir(dir: &Path) -> Result<Vec<PathBuf>, ToolboxError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?;
    for entry in entries {
        let path = entry.map_err(anyhow::Error::from)?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Prepare `work_dir` for running `spec`.
///
/// `resources` are the files available from upstream items. Includes are
/// copied only when the work directory is not the source directory.
pub fn stage_work_dir(
    spec: &ToolSpecification,
    work_dir: &Path,
    resources: &[PathBuf],
) -> Result<StagedInputs, ToolboxError> {
    let source_dir = spec.source_dir().ok_or_else(|| {
        ToolboxError::Staging(format!(
            "specification '{}' has no source directory",
            spec.name
        ))
    })?;
    if !paths_equal(&source_dir, work_dir) {
        copy_includes(spec, &source_dir, work_dir)?;
    }
    let required = stage_required_inputs(spec, resources, work_dir)?;
    let optional = stage_optional_inputs(spec, resources, work_dir)?;
    create_output_dirs(spec, work_dir)?;
    info!(
        spec = %spec.name,
        work_dir = %work_dir.display(),
        required = required.len(),
        optional = optional.len(),
        "staged work directory"
    );
    Ok(StagedInputs { required, optional })
}

fn paths_equal(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn copy_includes(
    spec: &ToolSpecification,
    source_dir: &Path,
    work_dir: &Path,
) -> Result<(), ToolboxError> {
    let mut missing = Vec::new();
    for include in &spec.includes {
        let source = source_dir.join(include);
        let destination = work_dir.join(include);
        if is_directory_entry(include) {
            if source.is_dir() {
                copy_dir_all(&source, &destination)?;
            } else {
                std::fs::create_dir_all(&destination).with_context(|| {
                    format!("failed to create directory: {}", destination.display())
                })?;
            }
        } else if source.is_file() {
            copy_file(&source, &destination)?;
        } else {
            missing.push(include.clone());
        }
    }
    if !missing.is_empty() {
        return Err(ToolboxError::Staging(format!(
            "source files not found in {}: {}",
            source_dir.display(),
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Copy required inputs, located among `resources` by file name.
///
/// Every missing file is reported in one error.
fn stage_required_inputs(
    spec: &ToolSpecification,
    resources: &[PathBuf],
    work_dir: &Path,
) -> Result<Vec<PathBuf>, ToolboxError> {
    let mut by_name: HashMap<&std::ffi::OsStr, &PathBuf> = HashMap::new();
    for resource in resources {
        if let Some(name) = resource.file_name() {
            by_name.entry(name).or_insert(resource);
        }
    }

    let mut staged = Vec::new();
    let mut missing = Vec::new();
    for entry in &spec.inputfiles {
        let destination = work_dir.join(entry);
        if is_directory_entry(entry) {
            std::fs::create_dir_all(&destination).with_context(|| {
                format!("failed to create directory: {}", destination.display())
            })?;
            continue;
        }
        let source = Path::new(entry)
            .file_name()
            .and_then(|name| by_name.get(name));
        match source {
            Some(source) => {
                copy_file(source, &destination)?;
                staged.push(destination);
            }
            None => missing.push(entry.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(ToolboxError::MissingInputFiles { missing });
    }
    Ok(staged)
}

/// Copy optional inputs whose file names match the `inputfiles_opt` patterns.
fn stage_optional_inputs(
    spec: &ToolSpecification,
    resources: &[PathBuf],
    work_dir: &Path,
) -> Result<Vec<PathBuf>, ToolboxError> {
    let options = MatchOptions {
        case_sensitive: !cfg!(windows),
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let mut staged = Vec::new();
    for entry in &spec.inputfiles_opt {
        let entry_path = Path::new(entry);
        let Some(file_pattern) = entry_path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let sub_dir = entry_path.parent().unwrap_or(Path::new(""));
        let pattern = Pattern::new(file_pattern).map_err(|e| {
            ToolboxError::Staging(format!("invalid optional input pattern '{}': {}", entry, e))
        })?;

        let mut matched = 0;
        for resource in resources {
            let Some(name) = resource.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if pattern.matches_with(name, options) {
                let destination = work_dir.join(sub_dir).join(name);
                copy_file(resource, &destination)?;
                if !staged.contains(&destination) {
                    staged.push(destination);
                }
                matched += 1;
            }
        }
        if matched == 0 && !has_wildcards(entry) {
            debug!(entry = %entry, "optional input file not available");
        }
    }
    Ok(staged)
}

/// Create the directories output files will be written to
pub fn create_output_dirs(spec: &ToolSpecification, work_dir: &Path) -> Result<(), ToolboxError> {
    for entry in &spec.outputfiles {
        let dir = if is_directory_entry(entry) {
            work_dir.join(entry)
        } else {
            match Path::new(entry).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => work_dir.join(parent),
                _ => continue,
            }
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory: {}", dir.display()))?;
    }
    Ok(())
}
