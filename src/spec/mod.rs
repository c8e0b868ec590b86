mod cmdline;
mod tool_type;

pub use cmdline::{join_args, split_args};
pub use tool_type::ToolType;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::ToolboxError;

/// A Tool specification: what a Tool item runs and which files it needs.
///
/// Deserialization validates the document, so a successfully parsed
/// specification always has a name, a tool type and a main program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSpecification")]
pub struct ToolSpecification {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub tooltype: ToolType,

    /// Directory of the includes relative to the definition file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub includes_main_path: Option<String>,

    pub execute_in_work: bool,

    /// Main program first, then additional source files
    pub includes: Vec<String>,

    pub inputfiles: Vec<String>,

    pub inputfiles_opt: Vec<String>,

    pub outputfiles: Vec<String>,

    pub cmdline_args: String,

    /// File the specification was loaded from
    #[serde(skip)]
    pub definition_file_path: Option<PathBuf>,
}

/// Accepts `cmdline_args` both as a string and as a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCmdlineArgs {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawSpecification {
    name: Option<String>,
    description: Option<String>,
    tooltype: Option<String>,
    includes_main_path: Option<String>,
    execute_in_work: Option<bool>,
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    inputfiles: Vec<String>,
    #[serde(default)]
    inputfiles_opt: Vec<String>,
    #[serde(default)]
    outputfiles: Vec<String>,
    cmdline_args: Option<RawCmdlineArgs>,
}

impl TryFrom<RawSpecification> for ToolSpecification {
    type Error = ToolboxError;

    fn try_from(raw: RawSpecification) -> Result<Self, Self::Error> {
        let name = raw
            .name
            .ok_or_else(|| ToolboxError::invalid_spec("<unnamed>", "missing 'name'"))?;
        let tooltype = raw
            .tooltype
            .ok_or_else(|| ToolboxError::invalid_spec(&name, "missing 'tooltype'"))?
            .parse::<ToolType>()
            .map_err(|e| ToolboxError::invalid_spec(&name, e.to_string()))?;
        let cmdline_args = match raw.cmdline_args {
            None => String::new(),
            Some(RawCmdlineArgs::Text(text)) => text,
            Some(RawCmdlineArgs::List(list)) => join_args(&list),
        };

        let spec = Self {
            name,
            description: raw.description,
            tooltype,
            includes_main_path: raw.includes_main_path,
            execute_in_work: raw.execute_in_work.unwrap_or(true),
            includes: raw.includes,
            inputfiles: raw.inputfiles,
            inputfiles_opt: raw.inputfiles_opt,
            outputfiles: raw.outputfiles,
            cmdline_args,
            definition_file_path: None,
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl PartialEq for ToolSpecification {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.tooltype == other.tooltype
            && self.includes_main_path == other.includes_main_path
            && self.execute_in_work == other.execute_in_work
            && self.includes == other.includes
            && self.inputfiles == other.inputfiles
            && self.inputfiles_opt == other.inputfiles_opt
            && self.outputfiles == other.outputfiles
            && self.cmdline_args == other.cmdline_args
    }
}

impl Eq for ToolSpecification {}

impl ToolSpecification {
    /// Create a minimal specification
    pub fn new(
        name: impl Into<String>,
        tooltype: ToolType,
        main_program: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            tooltype,
            includes_main_path: None,
            execute_in_work: true,
            includes: vec![main_program.into()],
            inputfiles: Vec::new(),
            inputfiles_opt: Vec::new(),
            outputfiles: Vec::new(),
            cmdline_args: String::new(),
            definition_file_path: None,
        }
    }

    /// Parse and validate a specification document
    pub fn from_json(json: &str) -> Result<Self, ToolboxError> {
        let raw: RawSpecification = serde_json::from_str(json)
            .map_err(|e| ToolboxError::invalid_spec(name_hint(json), e.to_string()))?;
        Self::try_from(raw)
    }

    /// Serialize to a pretty-printed JSON document
    pub fn to_json(&self) -> Result<String, ToolboxError> {
        serde_json::to_string_pretty(self)
            .context("failed to serialize tool specification")
            .map_err(ToolboxError::from)
    }

    /// Read a specification file
    pub fn load(path: &Path) -> Result<Self, ToolboxError> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read specification: {}", path.display()))?;
        let mut spec = Self::from_json(&content)?;
        spec.definition_file_path = Some(path.to_path_buf());
        debug!(name = %spec.name, path = %path.display(), "loaded tool specification");
        Ok(spec)
    }

    /// Write the specification to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ToolboxError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create directory: {}", parent.display())
                })?;
            }
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write specification: {}", path.display()))?;
        debug!(name = %self.name, path = %path.display(), "saved tool specification");
        Ok(())
    }

    /// Check the invariants every specification must hold
    pub fn validate(&self) -> Result<(), ToolboxError> {
        if self.name.trim().is_empty() {
            return Err(ToolboxError::invalid_spec(&self.name, "name is empty"));
        }
        let main = self
            .includes
            .first()
            .filter(|main| !main.trim().is_empty())
            .ok_or_else(|| ToolboxError::invalid_spec(&self.name, "missing main program"))?;
        if is_directory_entry(main) {
            return Err(ToolboxError::invalid_spec(
                &self.name,
                format!("main program '{}' is a directory", main),
            ));
        }

        let entries = self
            .includes
            .iter()
            .chain(&self.inputfiles)
            .chain(&self.inputfiles_opt)
            .chain(&self.outputfiles);
        for entry in entries {
            if !is_relative_entry(entry) {
                return Err(ToolboxError::invalid_spec(
                    &self.name,
                    format!("path '{}' must be relative and stay inside its directory", entry),
                ));
            }
        }
        Ok(())
    }

    /// The main program, relative to [`source_dir`](Self::source_dir)
    pub fn main_program(&self) -> &str {
        self.includes.first().map(String::as_str).unwrap_or_default()
    }

    /// Directory holding the includes
    pub fn source_dir(&self) -> Option<PathBuf> {
        let definition_dir = self.definition_file_path.as_deref()?.parent()?;
        Some(match &self.includes_main_path {
            Some(main_path) => definition_dir.join(main_path),
            None => definition_dir.to_path_buf(),
        })
    }

    /// `cmdline_args` split into separate arguments
    pub fn cmdline_args_list(&self) -> Vec<String> {
        split_args(&self.cmdline_args)
    }
}

/// Whether a path entry names a directory
pub fn is_directory_entry(entry: &str) -> bool {
    entry.ends_with('/') || entry.ends_with('\\')
}

/// Whether a path entry contains `?` or `*`
pub fn has_wildcards(entry: &str) -> bool {
    entry.contains('*') || entry.contains('?')
}

fn is_relative_entry(entry: &str) -> bool {
    let path = Path::new(entry);
    !entry.is_empty()
        && !entry.starts_with('/')
        && !entry.starts_with('\\')
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn name_hint(json: &str) -> String {
    serde_json::from_str::<serde_json::Value>(json)
        .ok()
        .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
        .unwrap_or_else(|| "<unnamed>".to_string())
}
