//! SQLite-backed checkpoint saver
//!
//! [`SqliteCheckpointSaver`] persists checkpoints to a SQLite database so a
//! suspended thread survives process restarts. Rows are append-only: each
//! `put` inserts a new checkpoint row and `put_writes` inserts rows into a
//! separate writes table keyed by (thread, checkpoint).
//!
//! The schema lives in `migrations/` and is applied on connect.
//!
//! ```rust,no_run
//! use waypoint_checkpoint::{CheckpointConfig, CheckpointSaver, SqliteCheckpointSaver};
//!
//! # async fn example() -> waypoint_checkpoint::Result<()> {
//! let saver = SqliteCheckpointSaver::connect("/var/lib/waypoint/checkpoints.db", 5).await?;
//! let latest = saver.get_tuple(&CheckpointConfig::for_thread("ticket-42")).await?;
//! # Ok(())
//! # }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple, PendingWrite},
    error::{CheckpointError, Result},
    serializer::{JsonSerializer, SerializerProtocol},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Checkpoint saver storing serialized checkpoints in SQLite
#[derive(Debug, Clone)]
pub struct SqliteCheckpointSaver<S = JsonSerializer> {
    pool: SqlitePool,
    serializer: S,
}

impl SqliteCheckpointSaver<JsonSerializer> {
    /// Open (creating if needed) a database file and apply the schema
    pub async fn connect<P: AsRef<Path>>(database_path: P, max_connections: u32) -> Result<Self> {
        let path = database_path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| CheckpointError::Invalid("Invalid database path".to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))?
            .create_if_missing(true);

        debug!(path = %path.display(), "Connecting to checkpoint database");
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Checkpoint database connection established");
        Self::from_pool(pool).await
    }

    /// Private in-memory database, useful in tests
    ///
    /// Each SQLite in-memory connection is its own database, so the pool is
    /// limited to a single connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and apply the schema
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            serializer: JsonSerializer::new(),
        })
    }
}

impl<S: SerializerProtocol> SqliteCheckpointSaver<S> {
    /// Swap the blob serializer
    pub fn with_serializer<T: SerializerProtocol>(self, serializer: T) -> SqliteCheckpointSaver<T> {
        SqliteCheckpointSaver {
            pool: self.pool,
            serializer,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_writes(&self, thread_id: &str, checkpoint_id: &str) -> Result<Vec<PendingWrite>> {
        let rows = sqlx::query(
            "SELECT task_id, channel, value FROM checkpoint_writes
             WHERE thread_id = ? AND checkpoint_id = ?
             ORDER BY seq",
        )
        .bind(thread_id)
        .bind(checkpoint_id)
        .fetch_all(&self.pool)
        .await?;

        let mut writes = Vec::with_capacity(rows.len());
        for row in rows {
            let task_id: String = row.try_get("task_id")?;
            let channel: String = row.try_get("channel")?;
            let blob: Vec<u8> = row.try_get("value")?;
            writes.push((task_id, channel, self.serializer.loads(&blob)?));
        }
        Ok(writes)
    }

    async fn row_to_tuple(&self, row: &SqliteRow) -> Result<CheckpointTuple> {
        let thread_id: String = row.try_get("thread_id")?;
        let checkpoint_id: String = row.try_get("checkpoint_id")?;
        let parent_id: Option<String> = row.try_get("parent_checkpoint_id")?;
        let checkpoint_blob: Vec<u8> = row.try_get("checkpoint")?;
        let metadata_blob: Vec<u8> = row.try_get("metadata")?;

        let checkpoint: Checkpoint = self.serializer.loads(&checkpoint_blob)?;
        let metadata: CheckpointMetadata = self.serializer.loads(&metadata_blob)?;
        let pending_writes = self.load_writes(&thread_id, &checkpoint_id).await?;

        let config = CheckpointConfig::for_thread(thread_id.clone()).with_checkpoint_id(checkpoint_id);
        let mut tuple = CheckpointTuple::new(config, checkpoint, metadata)
            .with_pending_writes(pending_writes);
        if let Some(parent_id) = parent_id {
            tuple = tuple.with_parent_config(
                CheckpointConfig::for_thread(thread_id).with_checkpoint_id(parent_id),
            );
        }
        Ok(tuple)
    }

    async fn seq_of(&self, thread_id: Option<&str>, checkpoint_id: &str) -> Result<Option<i64>> {
        let row = match thread_id {
            Some(thread_id) => {
                sqlx::query("SELECT seq FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?")
                    .bind(thread_id)
                    .bind(checkpoint_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT seq FROM checkpoints WHERE checkpoint_id = ?")
                    .bind(checkpoint_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(match row {
            Some(row) => Some(row.try_get("seq")?),
            None => None,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT seq, thread_id, checkpoint_id, parent_checkpoint_id, checkpoint, metadata FROM checkpoints";

#[async_trait]
impl<S: SerializerProtocol + 'static> CheckpointSaver for SqliteCheckpointSaver<S> {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = config.require_thread_id()?;

        let row = match &config.checkpoint_id {
            Some(checkpoint_id) => {
                sqlx::query(&format!(
                    "{} WHERE thread_id = ? AND checkpoint_id = ?",
                    SELECT_COLUMNS
                ))
                .bind(thread_id)
                .bind(checkpoint_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "{} WHERE thread_id = ? ORDER BY seq DESC LIMIT 1",
                    SELECT_COLUMNS
                ))
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match row {
            Some(row) => Ok(Some(self.row_to_tuple(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let thread_id = config.and_then(|cfg| cfg.thread_id.as_deref());

        let rows = match thread_id {
            Some(thread_id) => {
                sqlx::query(&format!(
                    "{} WHERE thread_id = ? ORDER BY seq DESC",
                    SELECT_COLUMNS
                ))
                .bind(thread_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{} ORDER BY thread_id, seq DESC", SELECT_COLUMNS))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let cutoff = match before.and_then(|cfg| cfg.checkpoint_id.as_deref()) {
            Some(before_id) => {
                let before_thread = before.and_then(|cfg| cfg.thread_id.as_deref());
                self.seq_of(before_thread, before_id).await?
            }
            None => None,
        };

        let mut results = Vec::new();
        for row in rows {
            let seq: i64 = row.try_get("seq")?;
            if matches!(cutoff, Some(cut) if seq >= cut) {
                continue;
            }

            let tuple = self.row_to_tuple(&row).await?;
            if let Some(filter_map) = &filter {
                if !tuple.metadata.matches(filter_map) {
                    continue;
                }
            }

            results.push(Ok(tuple));
            if matches!(limit, Some(lim) if results.len() >= lim) {
                break;
            }
        }

        Ok(Box::pin(stream::iter(results)))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let thread_id = config.require_thread_id()?;

        let checkpoint_blob = self.serializer.dumps(&checkpoint)?;
        let metadata_blob = self.serializer.dumps(&metadata)?;

        sqlx::query(
            "INSERT INTO checkpoints (thread_id, checkpoint_id, parent_checkpoint_id, checkpoint, metadata)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(thread_id)
        .bind(&checkpoint.id)
        .bind(config.checkpoint_id.as_deref())
        .bind(checkpoint_blob)
        .bind(metadata_blob)
        .execute(&self.pool)
        .await?;

        debug!(thread_id, checkpoint_id = %checkpoint.id, "Stored checkpoint");

        Ok(CheckpointConfig {
            thread_id: Some(thread_id.to_string()),
            checkpoint_id: Some(checkpoint.id),
            extra: config.extra.clone(),
        })
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> Result<()> {
        let thread_id = config.require_thread_id()?;
        let checkpoint_id = config
            .checkpoint_id
            .as_deref()
            .ok_or_else(|| CheckpointError::Invalid("checkpoint_id is required".to_string()))?;

        if self.seq_of(Some(thread_id), checkpoint_id).await?.is_none() {
            return Err(CheckpointError::NotFound(checkpoint_id.to_string()));
        }

        let mut tx = self.pool.begin().await?;
        for (channel, value) in writes {
            let blob = self.serializer.dumps(&value)?;
            sqlx::query(
                "INSERT INTO checkpoint_writes (thread_id, checkpoint_id, task_id, channel, value)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(thread_id)
            .bind(checkpoint_id)
            .bind(&task_id)
            .bind(channel)
            .bind(blob)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM checkpoint_writes WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
