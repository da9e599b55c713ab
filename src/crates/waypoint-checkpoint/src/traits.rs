//! Checkpoint persistence trait
//!
//! [`CheckpointSaver`] is the seam between the execution engine and storage.
//! The engine calls [`put`](CheckpointSaver::put) after every step and on
//! suspension, [`put_writes`](CheckpointSaver::put_writes) to record resume
//! values, and [`get_tuple`](CheckpointSaver::get_tuple) to reload a thread.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use waypoint_checkpoint::{
//!     CheckpointSaver, CheckpointConfig, Checkpoint, CheckpointMetadata,
//!     CheckpointTuple, CheckpointStream, PendingWrite, Result,
//! };
//! use async_trait::async_trait;
//!
//! struct RedisCheckpointSaver { /* client */ }
//!
//! #[async_trait]
//! impl CheckpointSaver for RedisCheckpointSaver {
//!     async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> { todo!() }
//!     async fn list(/* ... */) -> Result<CheckpointStream> { todo!() }
//!     async fn put(/* ... */) -> Result<CheckpointConfig> { todo!() }
//!     async fn put_writes(/* ... */) -> Result<()> { todo!() }
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::Result,
};
use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;

/// Stream of checkpoint tuples, newest first
pub type CheckpointStream =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

/// Persistence backend for checkpoints
///
/// Implementations must keep checkpoints of different threads fully isolated
/// and must never modify a checkpoint after `put` returns; only pending
/// writes may be attached afterwards.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Fetch a checkpoint without its tuple data
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|tuple| tuple.checkpoint))
    }

    /// Fetch a checkpoint tuple
    ///
    /// Returns the checkpoint named by `config.checkpoint_id`, or the latest
    /// checkpoint of `config.thread_id` when no id is given.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// List checkpoints, newest first
    ///
    /// * `config` - restrict to one thread (all threads when `None`)
    /// * `filter` - keep checkpoints whose serialized metadata has these values
    /// * `before` - only checkpoints saved before this one
    /// * `limit` - maximum number of results
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Store a checkpoint
    ///
    /// `config.checkpoint_id`, when set, becomes the parent of the new
    /// checkpoint. Returns a config pointing at the stored checkpoint.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig>;

    /// Attach writes to the checkpoint named by `config`
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> Result<()>;

    /// Delete every checkpoint of a thread
    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let _ = thread_id;
        Ok(())
    }
}
