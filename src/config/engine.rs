use serde::{Deserialize, Serialize};

/// How many tool processes may run at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessLimiter {
    /// No limit
    #[default]
    Unlimited,
    /// One process per available CPU
    Auto,
    /// Limit given by `max_processes`
    User,
}

/// Execution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Process limiting mode
    #[serde(default)]
    pub process_limiter: ProcessLimiter,

    /// Maximum number of concurrent processes when `process_limiter` is `user`
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,

    /// Kill a tool process after this many seconds
    #[serde(default)]
    pub execution_timeout_secs: Option<u64>,
}

fn default_max_processes() -> usize {
    available_cpus()
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl EngineSettings {
    /// Number of permits for the process limiter, `None` for unlimited
    pub fn process_limit(&self) -> Option<usize> {
        match self.process_limiter {
            ProcessLimiter::Unlimited => None,
            ProcessLimiter::Auto => Some(available_cpus()),
            ProcessLimiter::User => Some(self.max_processes.max(1)),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            process_limiter: ProcessLimiter::default(),
            max_processes: default_max_processes(),
            execution_timeout_secs: None,
        }
    }
}
