use anyhow::Result;
use async_trait::async_trait;

use super::RunRecord;

/// Storage backend for run records
#[async_trait]
pub trait Storage: Send + Sync {
    /// Save a run, replacing any record with the same ID
    async fn save(&self, record: &RunRecord) -> Result<()>;

    /// Load a run by ID
    async fn load(&self, id: &str) -> Result<Option<RunRecord>>;

    /// List all runs, newest first
    async fn list(&self) -> Result<Vec<RunRecord>>;

    /// Delete a run. Returns false if no such run existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}
