//! PostgreSQL-backed backend (behind the `postgres-backend` feature).
//!
//! `checkpoint_versions` holds one counter row per thread, bumped with an
//! `INSERT ... ON CONFLICT DO UPDATE ... RETURNING` upsert so version
//! assignment is a single atomic statement even under concurrent writers
//! across processes. `agent_checkpoints` holds the data rows, one per
//! checkpoint, keyed by `(thread_id, version)`; `message_log`, `metadata`,
//! and `execution_context` are folded into the `data` JSONB column so the
//! table matches the schema this store's spec carries across backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::{
    checkpoint::{Checkpoint, CheckpointId, ExecutionContext, ROLLBACK_FROM_VERSION_KEY},
    error::{CheckpointStoreError, Result},
    store::CheckpointStore,
};

#[derive(serde::Serialize, serde::Deserialize)]
struct CheckpointData {
    #[serde(default)]
    message_log: Vec<String>,
    #[serde(default)]
    metadata: std::collections::BTreeMap<String, serde_json::Value>,
    execution_context: Option<ExecutionContext>,
}

/// [`CheckpointStore`] backed by a Postgres database, for deployments that
/// already run Postgres for other durable state and want checkpoints in the
/// same place rather than standing up Redis or a shared filesystem.
#[derive(Debug, Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    /// Connect to `database_url` and create the backing tables if they don't
    /// already exist.
    ///
    /// # Errors
    /// Returns an error if the connection or schema migration fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS checkpoint_versions (
                thread_id TEXT PRIMARY KEY,
                next_version BIGINT NOT NULL DEFAULT 1
            )
            ",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS agent_checkpoints (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                state TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                parent_id TEXT,
                UNIQUE (thread_id, version)
            )
            ",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    async fn next_version(&self, thread_id: &str) -> Result<u64> {
        let row = sqlx::query(
            r"
            INSERT INTO checkpoint_versions (thread_id, next_version)
            VALUES ($1, 2)
            ON CONFLICT (thread_id)
            DO UPDATE SET next_version = checkpoint_versions.next_version + 1
            RETURNING next_version - 1
            ",
        )
        .bind(thread_id)
        .fetch_one(&self.pool)
        .await?;
        let version: i64 = row.try_get(0)?;
        Ok(version as u64)
    }

    async fn save_locked(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint> {
        if checkpoint.version == 0 {
            checkpoint.version = self.next_version(&checkpoint.thread_id).await?;
        }

        let data = CheckpointData {
            message_log: checkpoint.message_log.clone(),
            metadata: checkpoint.metadata.clone(),
            execution_context: checkpoint.execution_context.clone(),
        };

        sqlx::query(
            r"
            INSERT INTO agent_checkpoints (id, thread_id, agent_id, version, state, data, created_at, parent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(checkpoint.id.to_string())
        .bind(&checkpoint.thread_id)
        .bind(&checkpoint.agent_id)
        .bind(checkpoint.version as i64)
        .bind(checkpoint.state.to_string())
        .bind(serde_json::to_value(&data)?)
        .bind(checkpoint.created_at)
        .bind(checkpoint.parent_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(checkpoint)
    }

    fn row_to_checkpoint(row: &sqlx::postgres::PgRow) -> Result<Checkpoint> {
        let id: String = row.try_get("id")?;
        let version: i64 = row.try_get("version")?;
        let parent_id: Option<String> = row.try_get("parent_id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let state: String = row.try_get("state")?;
        let data: serde_json::Value = row.try_get("data")?;
        let data: CheckpointData = serde_json::from_value(data)?;

        Ok(Checkpoint {
            id: id.parse().map_err(|_| CheckpointStoreError::Internal("corrupt checkpoint id".into()))?,
            thread_id: row.try_get("thread_id")?,
            agent_id: row.try_get("agent_id")?,
            version: version as u64,
            // `AgentState::from_str` is `Infallible`.
            state: state.parse().expect("AgentState::from_str is infallible"),
            message_log: data.message_log,
            metadata: data.metadata,
            created_at,
            parent_id: parent_id
                .map(|s| s.parse())
                .transpose()
                .map_err(|_| CheckpointStoreError::Internal("corrupt parent id".into()))?,
            execution_context: data.execution_context,
        })
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<Checkpoint> {
        self.save_locked(checkpoint).await
    }

    async fn load(&self, id: CheckpointId) -> Result<Checkpoint> {
        let row = sqlx::query("SELECT * FROM agent_checkpoints WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CheckpointStoreError::NotFoundById(id.to_string()))?;
        Self::row_to_checkpoint(&row)
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint> {
        let row = sqlx::query(
            "SELECT * FROM agent_checkpoints WHERE thread_id = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CheckpointStoreError::ThreadEmpty(thread_id.to_string()))?;
        Self::row_to_checkpoint(&row)
    }

    async fn list(&self, thread_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        let limit = if limit == 0 { i64::MAX } else { limit as i64 };
        let rows = sqlx::query(
            "SELECT * FROM agent_checkpoints WHERE thread_id = $1 ORDER BY version DESC LIMIT $2",
        )
        .bind(thread_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_checkpoint).collect()
    }

    async fn load_version(&self, thread_id: &str, version: u64) -> Result<Checkpoint> {
        let row = sqlx::query("SELECT * FROM agent_checkpoints WHERE thread_id = $1 AND version = $2")
            .bind(thread_id)
            .bind(version as i64)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CheckpointStoreError::NotFound {
                thread_id: thread_id.to_string(),
                version,
            })?;
        Self::row_to_checkpoint(&row)
    }

    async fn list_versions(&self, thread_id: &str) -> Result<Vec<u64>> {
        let rows = sqlx::query("SELECT version FROM agent_checkpoints WHERE thread_id = $1 ORDER BY version ASC")
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| r.try_get::<i64, _>(0).map(|v| v as u64).map_err(Into::into)).collect()
    }

    async fn delete(&self, id: CheckpointId) -> Result<()> {
        let result = sqlx::query("DELETE FROM agent_checkpoints WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CheckpointStoreError::NotFoundById(id.to_string()));
        }
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM agent_checkpoints WHERE thread_id = $1")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM checkpoint_versions WHERE thread_id = $1")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, thread_id: &str, to_version: u64) -> Result<Checkpoint> {
        let source = self.load_version(thread_id, to_version).await?;
        let mut next = source.clone();
        next.id = CheckpointId::generate();
        next.version = 0;
        next.created_at = Utc::now();
        next.parent_id = Some(source.id);
        next.metadata.insert(ROLLBACK_FROM_VERSION_KEY.to_string(), serde_json::json!(to_version));
        self.save_locked(next).await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
