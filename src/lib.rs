pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod history;
pub mod project;
pub mod spec;

pub use config::{EngineSettings, ProcessLimiter, Settings};
pub use error::ToolboxError;
pub use event::{DagState, Event, EventSender, ItemState, MessageLevel, OutputStream};
pub use execution::{Engine, ExecutionRequest, ExecutionSummary, ItemOutcome};
pub use history::{RunRecord, RunStatus, SqliteStorage, Storage};
pub use project::{Connection, Dag, ItemDict, ItemType, LATEST_PROJECT_VERSION, Project};
pub use spec::{ToolSpecification, ToolType};
