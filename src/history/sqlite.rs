use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::debug;

use super::{RunRecord, Storage};
use crate::project::CONFIG_DIR;

const DB_FILE: &str = "runs.db";

/// SQLite-based run storage
pub struct SqliteStorage {
    /// Path to the SQLite database file
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a new SQLite storage at the given path
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let storage = Self { db_path };
        storage.init_schema()?;

        Ok(storage)
    }

    /// Storage inside a project's `.spinetoolbox` directory
    pub fn for_project(project_dir: &Path) -> Result<Self> {
        Self::new(project_dir.join(CONFIG_DIR).join(DB_FILE))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("failed to open database: {}", self.db_path.display()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                item_name TEXT NOT NULL,
                specification TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                exit_code INTEGER,
                error TEXT,
                data TEXT NOT NULL
            )",
            [],
        )
        .context("failed to create runs table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at)",
            [],
        )
        .context("failed to create started_at index")?;

        debug!(path = %self.db_path.display(), "initialized run history");

        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save(&self, record: &RunRecord) -> Result<()> {
        let record = record.clone();
        let db_path = self.db_path.clone();

        task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            let data = serde_json::to_string(&record)?;

            conn.execute(
                "INSERT OR REPLACE INTO runs (id, item_name, specification, status, started_at, finished_at, exit_code, error, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    record.id,
                    record.item_name,
                    record.specification,
                    record.status.to_string(),
                    record.started_at.to_rfc3339(),
                    record.finished_at.map(|t| t.to_rfc3339()),
                    record.exit_code,
                    record.error,
                    data,
                ],
            )?;

            debug!(id = %record.id, status = %record.status, "saved run");

            Ok::<_, anyhow::Error>(())
        })
        .await
        .context("spawn_blocking failed")??;

        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<RunRecord>> {
        let id = id.to_string();
        let db_path = self.db_path.clone();

        task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            let mut stmt = conn.prepare("SELECT data FROM runs WHERE id = ?1")?;
            let result = stmt.query_row([&id], |row| row.get::<_, String>(0));

            match result {
                Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .context("spawn_blocking failed")?
    }

    async fn list(&self) -> Result<Vec<RunRecord>> {
        let db_path = self.db_path.clone();

        task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            let mut stmt = conn.prepare("SELECT data FROM runs ORDER BY started_at DESC")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            rows.iter()
                .map(|data| serde_json::from_str(data).context("corrupt run record"))
                .collect()
        })
        .await
        .context("spawn_blocking failed")?
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        let db_path = self.db_path.clone();

        task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            let deleted = conn.execute("DELETE FROM runs WHERE id = ?1", [&id])?;
            debug!(id = %id, deleted, "deleted run");
            Ok(deleted > 0)
        })
        .await
        .context("spawn_blocking failed")?
    }
}
