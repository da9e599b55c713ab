//! # waypoint-checkpoint - Durable state for suspendable graphs
//!
//! Checkpoint data structures and the [`CheckpointSaver`] persistence trait
//! used by `waypoint-core` to pause a graph run, hand control to a human and
//! continue later from exactly where it stopped.
//!
//! ## Overview
//!
//! A [`Checkpoint`] is an immutable snapshot taken after every execution
//! step. It records:
//!
//! - **values** - the full state as a JSON object
//! - **next** - the nodes that still have to run (empty once finished)
//! - **interrupts** - suspension requests waiting for a resume value
//!
//! Checkpoints are grouped into threads by [`CheckpointConfig::thread_id`].
//! Each thread is an independent conversation; nothing is shared between
//! threads.
//!
//! Data that arrives after a checkpoint was saved, such as a resume value or
//! the output of a node that completed while a sibling was suspended, is
//! attached as a [`PendingWrite`] through [`CheckpointSaver::put_writes`].
//!
//! ## Backends
//!
//! | Saver | Durability | Feature |
//! |-------|------------|---------|
//! | [`InMemoryCheckpointSaver`] | process lifetime | always |
//! | [`SqliteCheckpointSaver`] | on disk | `sqlite` (default) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waypoint_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver,
//!     CheckpointSource, InMemoryCheckpointSaver,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = InMemoryCheckpointSaver::new();
//!     let config = CheckpointConfig::for_thread("thread-123");
//!
//!     let checkpoint = Checkpoint::new(json!({"messages": []}), vec!["assistant".into()]);
//!     let metadata = CheckpointMetadata::new()
//!         .with_source(CheckpointSource::Input)
//!         .with_step(-1);
//!
//!     let saved = saver.put(&config, checkpoint, metadata).await?;
//!     let tuple = saver.get_tuple(&saved).await?.expect("just saved");
//!     assert_eq!(tuple.checkpoint.next, vec!["assistant"]);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata, CheckpointSource,
    CheckpointTuple, PendingInterrupt, PendingWrite,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{JsonSerializer, SerializerProtocol};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};
