/*!
SQLite checkpoint store.

Async [`CheckpointStore`] implementation backed by sqlx. Each checkpoint is
one row whose payload column holds the serialized
[`PersistedCheckpoint`](crate::runtime::persistence::PersistedCheckpoint);
rows are written in a single transaction, so a checkpoint is either fully
durable or absent.

When the `sqlite-migrations` feature is enabled, embedded migrations
(`sqlx::migrate!("./migrations")`) run on connect; disabling the feature
assumes external migration orchestration.

## Schema

- `checkpoints.workflow_id`  ← `checkpoint.workflow_id`
- `checkpoints.seq`          ← `checkpoint.seq` (unique per workflow)
- `checkpoints.stage`        ← `WorkflowState::encode()` (query filter)
- `checkpoints.payload_json` ← serialized `PersistedCheckpoint`
- `checkpoints.created_at`   ← RFC3339 timestamp
*/

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use crate::machine::WorkflowState;
use crate::runtime::checkpointer::{Checkpoint, CheckpointError, CheckpointStore};
use crate::runtime::persistence::PersistedCheckpoint;

impl From<sqlx::Error> for CheckpointError {
    fn from(e: sqlx::Error) -> Self {
        CheckpointError::Backend {
            message: e.to_string(),
        }
    }
}

/// Durable SQLite-backed checkpoint store.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: Arc<SqlitePool>,
}

impl SqliteCheckpointStore {
    /// Connect to the database and (with the `sqlite-migrations` feature)
    /// run embedded migrations.
    #[instrument(err)]
    pub async fn connect(database_url: &str) -> Result<Self, CheckpointError> {
        let pool = SqlitePool::connect(database_url).await?;
        #[cfg(feature = "sqlite-migrations")]
        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            return Err(CheckpointError::Backend {
                message: format!("migration failed: {e}"),
            });
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn decode_row(row: &SqliteRow) -> Result<Checkpoint, CheckpointError> {
        let payload: String = row.try_get("payload_json")?;
        let persisted = PersistedCheckpoint::from_json_str(&payload)?;
        Ok(Checkpoint::try_from(persisted)?)
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    #[instrument(skip(self, checkpoint), fields(workflow_id = %checkpoint.workflow_id, seq = checkpoint.seq), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let persisted = PersistedCheckpoint::from(&checkpoint);
        let payload = persisted.to_json_string()?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r"
            INSERT INTO checkpoints (workflow_id, seq, stage, payload_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(&checkpoint.workflow_id)
        .bind(checkpoint.seq as i64)
        .bind(checkpoint.stage.encode())
        .bind(&payload)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load(
        &self,
        workflow_id: &str,
        stage: WorkflowState,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let row: Option<SqliteRow> = sqlx::query(
            r"
            SELECT payload_json FROM checkpoints
            WHERE workflow_id = ?1 AND stage = ?2
            ORDER BY seq DESC
            LIMIT 1
            ",
        )
        .bind(workflow_id)
        .bind(stage.encode())
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn load_latest(&self, workflow_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let row: Option<SqliteRow> = sqlx::query(
            r"
            SELECT payload_json FROM checkpoints
            WHERE workflow_id = ?1
            ORDER BY seq DESC
            LIMIT 1
            ",
        )
        .bind(workflow_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn list_checkpoints(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        let rows = sqlx::query(
            r"
            SELECT payload_json FROM checkpoints
            WHERE workflow_id = ?1
            ORDER BY seq ASC
            ",
        )
        .bind(workflow_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn list_workflows(&self) -> Result<Vec<String>, CheckpointError> {
        let rows = sqlx::query(
            r"
            SELECT DISTINCT workflow_id FROM checkpoints ORDER BY workflow_id
            ",
        )
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("workflow_id").map_err(Into::into))
            .collect()
    }
}
