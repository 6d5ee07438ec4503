//! SQLite-based persistence store

use crate::core::RunStatus;
use crate::persistence::{ExecutionSummary, PersistenceBackend};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY,
        pipeline_name TEXT NOT NULL,
        status TEXT NOT NULL,
        step_index INTEGER,
        failed_step TEXT,
        exit_code INTEGER,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        total_steps INTEGER NOT NULL DEFAULT 0,
        succeeded_steps INTEGER NOT NULL DEFAULT 0,
        failed_steps INTEGER NOT NULL DEFAULT 0,
        skipped_steps INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pipeline_name ON executions(pipeline_name)",
    "CREATE INDEX IF NOT EXISTS idx_status ON executions(status)",
    "CREATE INDEX IF NOT EXISTS idx_started_at ON executions(started_at)",
];

const COLUMNS: &str = "id, pipeline_name, status, step_index, failed_step, exit_code, \
     started_at, completed_at, total_steps, succeeded_steps, failed_steps, skipped_steps";

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (or create) a store at `db_path`
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// Store backed by a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        Self::connect(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("ci-runner");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Self::new(db_dir.join("executions.db")).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // A single long-lived connection keeps in-memory databases alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }
        Ok(())
    }

    fn timestamp(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid timestamp '{}'", raw))?
            .with_timezone(&Utc))
    }

    /// Rebuild a status from its label and columns
    fn parse_status(label: &str, step_index: Option<i64>, exit_code: Option<i64>) -> Result<RunStatus> {
        let status = match (label, step_index, exit_code) {
            ("not_started", _, _) => RunStatus::NotStarted,
            ("running", Some(index), _) => RunStatus::Running {
                step_index: index as usize,
            },
            ("succeeded", _, _) => RunStatus::Succeeded,
            ("failed", Some(index), Some(code)) => RunStatus::Failed {
                step_index: index as usize,
                exit_code: code as i32,
            },
            _ => return Err(anyhow!("Invalid stored status '{}'", label)),
        };
        Ok(status)
    }

    fn from_row(row: &SqliteRow) -> Result<ExecutionSummary> {
        let step_index: Option<i64> = row.try_get("step_index")?;
        let exit_code: Option<i64> = row.try_get("exit_code")?;
        let completed_at: Option<String> = row.try_get("completed_at")?;

        Ok(ExecutionSummary {
            execution_id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
            pipeline_name: row.try_get("pipeline_name")?,
            status: Self::parse_status(&row.try_get::<String, _>("status")?, step_index, exit_code)?,
            failed_step: row.try_get("failed_step")?,
            exit_code: exit_code.map(|code| code as i32),
            started_at: Self::parse_timestamp(&row.try_get::<String, _>("started_at")?)?,
            completed_at: completed_at.as_deref().map(Self::parse_timestamp).transpose()?,
            total_steps: row.try_get::<i64, _>("total_steps")? as usize,
            succeeded_steps: row.try_get::<i64, _>("succeeded_steps")? as usize,
            failed_steps: row.try_get::<i64, _>("failed_steps")? as usize,
            skipped_steps: row.try_get::<i64, _>("skipped_steps")? as usize,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let step_index = match execution.status {
            RunStatus::Running { step_index } | RunStatus::Failed { step_index, .. } => {
                Some(step_index as i64)
            }
            _ => None,
        };

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions
            (id, pipeline_name, status, step_index, failed_step, exit_code, started_at,
             completed_at, total_steps, succeeded_steps, failed_steps, skipped_steps)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(execution.execution_id.to_string())
        .bind(&execution.pipeline_name)
        .bind(execution.status.label())
        .bind(step_index)
        .bind(execution.failed_step.clone())
        .bind(execution.exit_code.map(i64::from))
        .bind(Self::timestamp(execution.started_at))
        .bind(execution.completed_at.map(Self::timestamp))
        .bind(execution.total_steps as i64)
        .bind(execution.succeeded_steps as i64)
        .bind(execution.failed_steps as i64)
        .bind(execution.skipped_steps as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save execution")?;

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let row = sqlx::query(&format!("SELECT {} FROM executions WHERE id = ?1", COLUMNS))
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load execution")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE pipeline_name = ?1 ORDER BY started_at DESC",
            COLUMNS
        ))
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list executions")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn latest_execution(&self, pipeline_name: &str) -> Result<Option<ExecutionSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE pipeline_name = ?1 ORDER BY started_at DESC LIMIT 1",
            COLUMNS
        ))
        .bind(pipeline_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get latest execution")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn delete_execution(&self, execution_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM executions WHERE id = ?1")
            .bind(execution_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete execution")?;

        Ok(())
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM executions
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("pipeline_name").map_err(anyhow::Error::from))
            .collect()
    }
}
