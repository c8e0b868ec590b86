use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of a serialized path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Path,
    FileUrl,
    Url,
}

/// A path as stored in the project file.
///
/// Paths inside the project directory are stored relative to it so projects
/// can be moved around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPath {
    #[serde(rename = "type")]
    pub kind: PathKind,
    #[serde(default)]
    pub relative: bool,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

impl SerializedPath {
    /// Serialize a filesystem path, relative to `project_dir` when inside it
    pub fn from_path(path: &Path, project_dir: &Path) -> Self {
        match path.strip_prefix(project_dir) {
            Ok(relative) if path.is_absolute() => Self {
                kind: PathKind::Path,
                relative: true,
                path: to_forward_slashes(relative),
                scheme: None,
            },
            _ => Self {
                kind: PathKind::Path,
                relative: false,
                path: to_forward_slashes(path),
                scheme: None,
            },
        }
    }

    /// Resolve against the project directory
    pub fn resolve(&self, project_dir: &Path) -> PathBuf {
        if self.relative {
            project_dir.join(&self.path)
        } else {
            PathBuf::from(&self.path)
        }
    }

    /// Resolve a URL entry into a URL string
    ///
    /// File URLs become `<scheme>:///<absolute path>`; plain paths have no URL.
    pub fn resolve_url(&self, project_dir: &Path) -> Option<String> {
        match self.kind {
            PathKind::Path => None,
            PathKind::Url => Some(self.path.clone()),
            PathKind::FileUrl => {
                let scheme = self.scheme.as_deref().unwrap_or("sqlite");
                let path = self.resolve(project_dir);
                Some(format!("{}:///{}", scheme, to_forward_slashes(&path)))
            }
        }
    }
}

fn to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
