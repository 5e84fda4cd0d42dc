/// SQLite persistence layer for workflows and schedules
///
/// Definitions are stored as JSON so editor-only fields survive untouched,
/// with the id and name kept in indexed columns for lookups and listing.

use crate::workflow::store::{ScheduleStore, WorkflowStore};
use crate::workflow::types::{ScheduledWorkflow, Workflow};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::str::FromStr;

/// SQLite-backed workflow and schedule storage
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    /// SQLite connection pool
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Wrap an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database and initialise the schema
    pub async fn connect(database_url: &str) -> Result<Self> {
        tracing::info!("🗄️ Opening workflow database: {}", database_url);
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| anyhow::anyhow!("Invalid database URL '{}': {}", database_url, e))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;

        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and indexes; safe to call repeatedly
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                definition JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_name ON workflows(name)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_workflows (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                entry JSON NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for SqliteStorage {
    async fn get(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                Ok(Some(serde_json::from_str(&definition_json)?))
            }
            None => Ok(None),
        }
    }

    /// UPSERT keeps `created_at` and bumps `updated_at`
    async fn save(&self, workflow: &Workflow) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, definition, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Workflow>> {
        let rows = sqlx::query("SELECT definition FROM workflows ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let definition_json: String = row.get("definition");
                serde_json::from_str(&definition_json).map_err(Into::into)
            })
            .collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ScheduleStore for SqliteStorage {
    async fn list_all(&self) -> Result<Vec<ScheduledWorkflow>> {
        let rows = sqlx::query("SELECT entry FROM scheduled_workflows ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let entry_json: String = row.get("entry");
                serde_json::from_str(&entry_json).map_err(Into::into)
            })
            .collect()
    }

    /// Replace the whole set in one transaction
    async fn save_all(&self, entries: &[ScheduledWorkflow]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM scheduled_workflows")
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query("INSERT INTO scheduled_workflows (id, workflow_id, entry) VALUES (?, ?, ?)")
                .bind(&entry.id)
                .bind(&entry.workflow_id)
                .bind(serde_json::to_string(entry)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::debug!("💾 Persisted {} scheduled workflows", entries.len());
        Ok(())
    }
}
