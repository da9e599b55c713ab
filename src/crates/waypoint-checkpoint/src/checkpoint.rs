//! Core checkpoint data structures
//!
//! This module defines the persisted shape of a suspendable workflow:
//!
//! - [`Checkpoint`] - immutable snapshot of state values, the next nodes to run
//!   and any suspension requests that are waiting on the caller
//! - [`CheckpointConfig`] - thread id plus optional checkpoint id
//! - [`CheckpointMetadata`] - source, step number and per-node writes
//! - [`CheckpointTuple`] - a checkpoint together with its config, parent and
//!   pending writes
//! - [`PendingInterrupt`] - a suspension request recorded in a checkpoint
//!
//! # Lifecycle
//!
//! ```text
//! invoke(input) ──► [input, step -1] ──► [loop, step 0] ──► [loop, step 1] ...
//!                                                         │
//!                                    node suspends ──────►│ [loop, step 1, interrupts = [..]]
//!                                                         │
//!                      resume(value) ─ put_writes(__resume__) on that checkpoint
//!                                                         ▼
//!                                                    [loop, step 2] ...
//! ```
//!
//! Checkpoints are never mutated once saved. A later checkpoint supersedes an
//! earlier one and points back at it through its parent config.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{CheckpointError, Result};

/// Checkpoint ID type
pub type CheckpointId = String;

/// Pending write tuple: (task_id, channel, value)
///
/// Writes are attached to a stored checkpoint without replacing it. The
/// engine uses them to record resume values and the outputs of nodes that
/// finished while a sibling node was suspended.
pub type PendingWrite = (String, String, Value);

/// Where a checkpoint came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Created from new input to invoke/stream
    Input,
    /// Created by the execution loop after a step or a suspension
    Loop,
    /// Created from a manual state update
    Update,
    /// Created as a copy of another checkpoint
    Fork,
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// The step number of the checkpoint
    ///
    /// -1 for the input checkpoint, 0 for the first loop step, n afterwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,

    /// Updates written by each node during the step, keyed by node name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writes: Option<Value>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_writes(mut self, writes: Value) -> Self {
        self.writes = Some(writes);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Check whether every `filter` entry equals the same key of the
    /// serialized metadata (`source`, `step`, `writes` or an extra key).
    pub fn matches(&self, filter: &HashMap<String, Value>) -> bool {
        let Ok(Value::Object(serialized)) = serde_json::to_value(self) else {
            return filter.is_empty();
        };
        filter
            .iter()
            .all(|(key, expected)| serialized.get(key) == Some(expected))
    }
}

/// A suspension request recorded in a checkpoint
///
/// `id` is stable across re-executions of the suspending node, so a caller
/// can answer it by id after reloading the thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingInterrupt {
    /// Stable identifier used to correlate the resume value
    pub id: String,

    /// Node that suspended
    pub node: String,

    /// Payload presented to the caller
    pub value: Value,
}

impl PendingInterrupt {
    pub fn new(id: impl Into<String>, node: impl Into<String>, value: Value) -> Self {
        Self {
            id: id.into(),
            node: node.into(),
            value,
        }
    }
}

/// State snapshot at a given point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The version of the checkpoint format
    pub v: i32,

    /// Unique ID of the checkpoint
    pub id: CheckpointId,

    /// When the checkpoint was created
    pub ts: DateTime<Utc>,

    /// State values at the time of the checkpoint
    pub values: Value,

    /// Nodes scheduled to run next; empty once the run has finished
    #[serde(default)]
    pub next: Vec<String>,

    /// Suspension requests waiting for a resume value
    #[serde(default)]
    pub interrupts: Vec<PendingInterrupt>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a checkpoint with a fresh id
    pub fn new(values: Value, next: Vec<String>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            values,
            next,
            interrupts: Vec::new(),
        }
    }

    /// Create an empty checkpoint
    pub fn empty() -> Self {
        Self::new(Value::Object(Default::default()), Vec::new())
    }

    pub fn with_interrupts(mut self, interrupts: Vec<PendingInterrupt>) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// Copy this checkpoint under a new id and timestamp
    pub fn fork(&self) -> Self {
        Self {
            v: self.v,
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            values: self.values.clone(),
            next: self.next.clone(),
            interrupts: self.interrupts.clone(),
        }
    }

    /// Whether execution stopped before reaching the end of the graph
    pub fn is_paused(&self) -> bool {
        !self.next.is_empty()
    }
}

/// Configuration identifying a thread and optionally one of its checkpoints
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointConfig {
    /// Workflow identifier grouping related checkpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Specific checkpoint ID to retrieve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,

    /// Additional configuration
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config pointing at the latest checkpoint of `thread_id`
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self::new().with_thread_id(thread_id)
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    /// The thread id, or [`CheckpointError::Invalid`] when missing
    pub fn require_thread_id(&self) -> Result<&str> {
        self.thread_id
            .as_deref()
            .ok_or_else(|| CheckpointError::Invalid("thread_id is required".to_string()))
    }

    /// Same thread, latest checkpoint
    pub fn latest(&self) -> Self {
        Self {
            thread_id: self.thread_id.clone(),
            checkpoint_id: None,
            extra: self.extra.clone(),
        }
    }
}

/// A checkpoint together with the data stored alongside it
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    /// Config pointing at this checkpoint
    pub config: CheckpointConfig,

    pub checkpoint: Checkpoint,

    pub metadata: CheckpointMetadata,

    /// Config of the checkpoint this one superseded
    pub parent_config: Option<CheckpointConfig>,

    /// Writes attached after the checkpoint was saved
    pub pending_writes: Vec<PendingWrite>,
}

impl CheckpointTuple {
    pub fn new(
        config: CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
            pending_writes: Vec::new(),
        }
    }

    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }

    pub fn with_pending_writes(mut self, writes: Vec<PendingWrite>) -> Self {
        self.pending_writes = writes;
        self
    }

    /// Pending writes recorded for one channel, in insertion order
    pub fn writes_for<'a>(&'a self, channel: &'a str) -> impl Iterator<Item = &'a PendingWrite> + 'a {
        self.pending_writes
            .iter()
            .filter(move |(_, ch, _)| ch == channel)
    }
}
