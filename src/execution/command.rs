use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::config::Settings;
use crate::error::ToolboxError;
use crate::spec::{ToolSpecification, ToolType};

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@@(optional_inputs|url_inputs|url:(?P<name>[^@]+))@@").expect("valid tag regex")
});

/// Values for the `@@...@@` tags in command line arguments
#[derive(Debug, Clone, Default)]
pub struct TagContext {
    /// Staged optional input files
    pub optional_inputs: Vec<PathBuf>,
    /// Database URLs of upstream Data Stores, by item name
    pub input_urls: BTreeMap<String, String>,
}

/// A fully resolved tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Expand tags in command line arguments.
///
/// An argument that is exactly a list tag expands into one argument per
/// value; tags inside a longer argument are replaced by space separated
/// values.
pub fn expand_tags(args: &[String], ctx: &TagContext) -> Result<Vec<String>, ToolboxError> {
    let mut expanded = Vec::new();
    for arg in args {
        if let Some(values) = whole_tag_values(arg, ctx) {
            expanded.extend(values);
            continue;
        }

        let mut result = String::new();
        let mut last = 0;
        for caps in TAG.captures_iter(arg) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            result.push_str(&arg[last..whole.start()]);
            let values = tag_values(&caps, ctx)?;
            result.push_str(&values.join(" "));
            last = whole.end();
        }
        result.push_str(&arg[last..]);
        expanded.push(result);
    }
    Ok(expanded)
}

fn whole_tag_values(arg: &str, ctx: &TagContext) -> Option<Vec<String>> {
    match arg {
        "@@optional_inputs@@" => Some(path_strings(&ctx.optional_inputs)),
        "@@url_inputs@@" => Some(ctx.input_urls.values().cloned().collect()),
        _ => None,
    }
}

fn tag_values(caps: &regex::Captures<'_>, ctx: &TagContext) -> Result<Vec<String>, ToolboxError> {
    if let Some(name) = caps.name("name") {
        return ctx
            .input_urls
            .get(name.as_str())
            .map(|url| vec![url.clone()])
            .ok_or_else(|| {
                ToolboxError::Staging(format!(
                    "no database URL available from '{}'",
                    name.as_str()
                ))
            });
    }
    Ok(match &caps[1] {
        "optional_inputs" => path_strings(&ctx.optional_inputs),
        _ => ctx.input_urls.values().cloned().collect(),
    })
}

fn path_strings(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

/// Build the command that runs `spec` in `work_dir`.
///
/// Specification arguments come first, followed by the item's own arguments.
pub fn build_command(
    spec: &ToolSpecification,
    item_args: &[String],
    work_dir: &Path,
    settings: &Settings,
    ctx: &TagContext,
) -> Result<ToolCommand, ToolboxError> {
    let mut tool_args = spec.cmdline_args_list();
    tool_args.extend(item_args.iter().cloned());
    let tool_args = expand_tags(&tool_args, ctx)?;
    let main = spec.main_program().to_string();

    let (program, mut args) = match spec.tooltype {
        ToolType::Julia => {
            let program = settings.julia_path.clone().unwrap_or_else(|| "julia".to_string());
            let mut args = Vec::new();
            if let Some(project) = settings.julia_project_path.as_deref().filter(|p| !p.is_empty()) {
                args.push(format!("--project={}", project));
            }
            args.push(main);
            (program, args)
        }
        ToolType::Python => {
            let default = if cfg!(windows) { "python" } else { "python3" };
            let program = settings
                .python_path
                .clone()
                .unwrap_or_else(|| default.to_string());
            (program, vec![main])
        }
        ToolType::Gams => {
            let program = settings.gams_path.clone().unwrap_or_else(|| "gams".to_string());
            let args = vec![
                main,
                format!("curdir={}", work_dir.display()),
                "logoption=3".to_string(),
            ];
            (program, args)
        }
        ToolType::Executable => executable_invocation(&main, work_dir),
    };
    args.extend(tool_args);

    Ok(ToolCommand {
        program,
        args,
        work_dir: work_dir.to_path_buf(),
    })
}

fn executable_invocation(main: &str, work_dir: &Path) -> (String, Vec<String>) {
    let extension = Path::new(main)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match extension.as_deref() {
        Some("sh") => ("sh".to_string(), vec![main.to_string()]),
        Some("bat") | Some("cmd") => (
            "cmd".to_string(),
            vec!["/C".to_string(), main.to_string()],
        ),
        _ => (work_dir.join(main).display().to_string(), Vec::new()),
    }
}
