use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// One execution of a Tool item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier
    pub id: String,

    /// Project directory the item belongs to
    pub project_dir: String,

    pub item_name: String,

    /// Name of the tool specification that ran
    pub specification: String,

    pub status: RunStatus,

    /// Work directory the tool ran in
    pub work_dir: Option<String>,

    /// Directory holding the archived outputs
    pub result_dir: Option<String>,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    pub exit_code: Option<i32>,

    /// Error message if the run failed
    pub error: Option<String>,
}

impl RunRecord {
    /// Start a new run record
    pub fn new(
        project_dir: &Path,
        item_name: impl Into<String>,
        specification: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_dir: project_dir.display().to_string(),
            item_name: item_name.into(),
            specification: specification.into(),
            status: RunStatus::Running,
            work_dir: None,
            result_dir: None,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            error: None,
        }
    }

    /// Mark the run finished with the process exit code
    pub fn finish(&mut self, exit_code: Option<i32>) {
        self.exit_code = exit_code;
        self.status = if exit_code == Some(0) {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        self.finished_at = Some(Utc::now());
    }

    /// Set an error and mark as failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock duration of a finished run
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

impl std::fmt::Display for RunRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id_short: String = self.id.chars().take(8).collect();
        let started = self.started_at.format("%Y-%m-%d %H:%M:%S");
        let duration = match self.duration() {
            Some(d) => format!("{}s", d.num_seconds()),
            None => "-".to_string(),
        };
        write!(
            f,
            "{:<10} {:<10} {:<20} {:<9} {:<20} {}",
            id_short, self.status, started, duration, self.item_name, self.specification
        )
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunStatus {
    /// Process started, not yet finished
    #[default]
    Running,
    /// Process exited with code 0
    Completed,
    /// Staging, launching or the process itself failed
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => anyhow::bail!(
                "invalid run status '{}' (expected: running, completed, failed)",
                s
            ),
        }
    }
}
