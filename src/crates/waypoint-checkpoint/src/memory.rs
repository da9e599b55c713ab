//! In-memory checkpoint saver
//!
//! [`InMemoryCheckpointSaver`] keeps every thread's checkpoints in a
//! `tokio::sync::RwLock`-guarded map. Nothing survives the process, which
//! makes it the right choice for tests, prototypes and single-session tools.
//!
//! ```rust,no_run
//! use waypoint_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver,
//!     InMemoryCheckpointSaver,
//! };
//!
//! # async fn example() -> waypoint_checkpoint::Result<()> {
//! let saver = InMemoryCheckpointSaver::new();
//! let config = CheckpointConfig::for_thread("thread-1");
//!
//! let saved = saver
//!     .put(&config, Checkpoint::empty(), CheckpointMetadata::new())
//!     .await?;
//! let tuple = saver.get_tuple(&saved).await?;
//! assert!(tuple.is_some());
//! # Ok(())
//! # }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple, PendingWrite},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CheckpointEntry {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    config: CheckpointConfig,
    parent_config: Option<CheckpointConfig>,
    writes: Vec<PendingWrite>,
}

impl CheckpointEntry {
    fn to_tuple(&self) -> CheckpointTuple {
        CheckpointTuple {
            config: self.config.clone(),
            checkpoint: self.checkpoint.clone(),
            metadata: self.metadata.clone(),
            parent_config: self.parent_config.clone(),
            pending_writes: self.writes.clone(),
        }
    }
}

/// Entries per thread, in insertion order
type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<CheckpointEntry>>>>;

/// Thread-isolated checkpoint storage held in memory
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of threads with at least one checkpoint
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of stored checkpoints across threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = config.require_thread_id()?;
        let storage = self.storage.read().await;

        let Some(entries) = storage.get(thread_id) else {
            return Ok(None);
        };

        let entry = match &config.checkpoint_id {
            Some(checkpoint_id) => entries.iter().find(|e| &e.checkpoint.id == checkpoint_id),
            None => entries.last(),
        };

        Ok(entry.map(CheckpointEntry::to_tuple))
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let mut results = Vec::new();

        let mut thread_ids: Vec<String> = match config.and_then(|cfg| cfg.thread_id.clone()) {
            Some(thread_id) => vec![thread_id],
            None => storage.keys().cloned().collect(),
        };
        thread_ids.sort();

        'threads: for thread_id in thread_ids {
            let Some(entries) = storage.get(&thread_id) else {
                continue;
            };

            // Position of the `before` checkpoint within this thread, if any
            let cutoff = before
                .and_then(|cfg| cfg.checkpoint_id.as_ref())
                .and_then(|id| entries.iter().position(|e| &e.checkpoint.id == id));

            for (index, entry) in entries.iter().enumerate().rev() {
                if matches!(cutoff, Some(cut) if index >= cut) {
                    continue;
                }

                if let Some(filter_map) = &filter {
                    if !entry.metadata.matches(filter_map) {
                        continue;
                    }
                }

                results.push(Ok(entry.to_tuple()));

                if matches!(limit, Some(lim) if results.len() >= lim) {
                    break 'threads;
                }
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
        let thread_id = config.require_thread_id()?.to_string();

        let checkpoint_config = CheckpointConfig {
            thread_id: Some(thread_id.clone()),
            checkpoint_id: Some(checkpoint.id.clone()),
            extra: config.extra.clone(),
        };

        let entry = CheckpointEntry {
            checkpoint,
            metadata,
            config: checkpoint_config.clone(),
            parent_config: config.checkpoint_id.as_ref().map(|_| config.clone()),
            writes: Vec::new(),
        };

        let mut storage = self.storage.write().await;
        let entries = storage.entry(thread_id).or_default();
        if entries.iter().any(|e| e.checkpoint.id == entry.checkpoint.id) {
            return Err(CheckpointError::Invalid(format!(
                "Checkpoint {} already exists",
                entry.checkpoint.id
            )));
        }
        entries.push(entry);

        Ok(checkpoint_config)
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
            .as_ref()
            .ok_or_else(|| CheckpointError::Invalid("checkpoint_id is required".to_string()))?;

        let mut storage = self.storage.write().await;

        let entry = storage
            .get_mut(thread_id)
            .and_then(|entries| entries.iter_mut().find(|e| &e.checkpoint.id == checkpoint_id))
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.clone()))?;

        for (channel, value) in writes {
            entry.writes.push((task_id.clone(), channel, value));
        }

        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}
