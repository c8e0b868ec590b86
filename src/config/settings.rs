use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::EngineSettings;

const SETTINGS_FILE: &str = "settings.toml";

/// Application settings
///
/// Loaded with precedence: env > project > global > defaults. The CLI applies
/// its own overrides on top of the loaded value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for tool work directories
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Python interpreter
    #[serde(default)]
    pub python_path: Option<String>,

    /// Julia executable
    #[serde(default)]
    pub julia_path: Option<String>,

    /// Julia project passed as `--project`
    #[serde(default)]
    pub julia_project_path: Option<String>,

    /// GAMS executable
    #[serde(default)]
    pub gams_path: Option<String>,

    /// Execution engine settings
    #[serde(default)]
    pub engine: EngineSettings,
}

impl Settings {
    /// Load settings for a project directory
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut settings = match global_settings_path() {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        if let Some(dir) = project_dir {
            let path = dir.join(".spinetoolbox").join(SETTINGS_FILE);
            if path.is_file() {
                let has_engine = has_engine_table(&path)?;
                settings.merge(Self::from_file(&path)?, has_engine);
            }
        }

        settings.apply_env();
        Ok(settings)
    }

    /// Parse a settings file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("invalid settings file: {}", path.display()))?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Overlay values set in `other`
    fn merge(&mut self, other: Self, with_engine: bool) {
        if other.work_dir.is_some() {
            self.work_dir = other.work_dir;
        }
        if other.python_path.is_some() {
            self.python_path = other.python_path;
        }
        if other.julia_path.is_some() {
            self.julia_path = other.julia_path;
        }
        if other.julia_project_path.is_some() {
            self.julia_project_path = other.julia_project_path;
        }
        if other.gams_path.is_some() {
            self.gams_path = other.gams_path;
        }
        if with_engine {
            self.engine = other.engine;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("SPINETOOLBOX_WORK_DIR") {
            self.work_dir = Some(PathBuf::from(dir));
        }
        if let Ok(python) = std::env::var("SPINETOOLBOX_PYTHON") {
            self.python_path = Some(python);
        }
        if let Ok(julia) = std::env::var("SPINETOOLBOX_JULIA") {
            self.julia_path = Some(julia);
        }
        if let Ok(gams) = std::env::var("SPINETOOLBOX_GAMS") {
            self.gams_path = Some(gams);
        }
    }

    /// Work directory root, defaulting to `<home>/.spinetoolbox/work`
    pub fn work_dir_root(&self) -> PathBuf {
        if let Some(dir) = &self.work_dir {
            return dir.clone();
        }
        match std::env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(".spinetoolbox").join("work"),
            Err(_) => std::env::temp_dir().join("spinetoolbox").join("work"),
        }
    }
}

fn has_engine_table(path: &Path) -> Result<bool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings: {}", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("invalid settings file: {}", path.display()))?;
    Ok(table.contains_key("engine"))
}

fn global_settings_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("spinetoolbox")
            .join(SETTINGS_FILE),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessLimiter;
    use tempfile::tempdir;

    #[test]
    fn parses_full_settings_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            r#"
work_dir = "/tmp/work"
python_path = "/usr/bin/python3"
gams_path = "gams"

[engine]
process_limiter = "auto"
execution_timeout_secs = 30
"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.work_dir, Some(PathBuf::from("/tmp/work")));
        assert_eq!(settings.python_path.as_deref(), Some("/usr/bin/python3"));
        assert_eq!(settings.julia_path, None);
        assert_eq!(settings.engine.process_limiter, ProcessLimiter::Auto);
        assert_eq!(settings.engine.execution_timeout_secs, Some(30));
    }

    #[test]
    fn project_settings_override_global_values() {
        let mut global = Settings {
            python_path: Some("python3.9".into()),
            julia_path: Some("julia".into()),
            ..Settings::default()
        };
        let project = Settings {
            python_path: Some("python3.12".into()),
            ..Settings::default()
        };
        global.merge(project, false);
        assert_eq!(global.python_path.as_deref(), Some("python3.12"));
        assert_eq!(global.julia_path.as_deref(), Some("julia"));
    }

    #[test]
    fn explicit_work_dir_wins() {
        let settings = Settings {
            work_dir: Some(PathBuf::from("/scratch")),
            ..Settings::default()
        };
        assert_eq!(settings.work_dir_root(), PathBuf::from("/scratch"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "work_dir = [").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }
}
