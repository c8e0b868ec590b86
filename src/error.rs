#[derive(Debug, thiserror::Error)]
pub enum ToolboxError {
    #[error("invalid tool specification: {name}: {reason}")]
    InvalidSpecification { name: String, reason: String },

    #[error("project error: {0}")]
    Project(String),

    #[error(
        "project version {found} is newer than what is supported by this version of Toolbox (latest {supported})"
    )]
    ProjectTooNew { found: u64, supported: u64 },

    #[error("Unsupported project version {found}. Open project in Toolbox GUI to upgrade it.")]
    ProjectTooOld { found: u64 },

    #[error("The project contains a graph that is not a Directed Acyclic Graph.")]
    NotADag,

    #[error("required input files missing: {}", missing.join(", "))]
    MissingInputFiles { missing: Vec<String> },

    #[error("staging error: {0}")]
    Staging(String),

    #[error("execution error: {item_name}: {message}")]
    Execution { item_name: String, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ToolboxError {
    pub(crate) fn invalid_spec(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSpecification {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
