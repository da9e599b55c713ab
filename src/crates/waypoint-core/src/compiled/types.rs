//! Inputs, outcomes and events of graph execution

use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use waypoint_checkpoint::{CheckpointConfig, CheckpointMetadata, CheckpointTuple, PendingInterrupt};

use crate::command::Command;
use crate::error::Result;
use crate::graph::NodeId;

/// Per-invocation configuration
///
/// `thread_id` selects the conversation; it is required when the graph has a
/// checkpointer. `checkpoint_id` starts from a specific historical checkpoint
/// instead of the latest one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,

    /// Overrides the compiled default step limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion_limit: Option<usize>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    /// Checkpoint config addressing the same thread and checkpoint
    pub fn checkpoint_config(&self) -> CheckpointConfig {
        CheckpointConfig {
            thread_id: self.thread_id.clone(),
            checkpoint_id: self.checkpoint_id.clone(),
            ..CheckpointConfig::default()
        }
    }
}

impl From<&CheckpointConfig> for RunConfig {
    fn from(config: &CheckpointConfig) -> Self {
        Self {
            thread_id: config.thread_id.clone(),
            checkpoint_id: config.checkpoint_id.clone(),
            recursion_limit: None,
        }
    }
}

/// What a caller feeds into `invoke` / `stream`
#[derive(Debug, Clone, PartialEq)]
pub enum GraphInput {
    /// State values merged into the thread's state; starts at the entry point.
    /// `Value::Null` on a paused thread continues it.
    Values(Value),

    /// Resume / update / redirect a thread
    Command(Command),
}

impl From<Value> for GraphInput {
    fn from(value: Value) -> Self {
        GraphInput::Values(value)
    }
}

impl From<Command> for GraphInput {
    fn from(cmd: Command) -> Self {
        GraphInput::Command(cmd)
    }
}

/// Result of one invocation
///
/// | `next` | `interrupts` | meaning |
/// |--------|--------------|---------|
/// | empty | empty | run finished |
/// | non-empty | non-empty | nodes suspended; resume with a `Command` |
/// | non-empty | empty | stopped at a static breakpoint |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// State after the last completed step
    pub values: Value,

    /// Nodes that will run when the thread is resumed
    pub next: Vec<NodeId>,

    /// Suspension requests waiting for an answer
    pub interrupts: Vec<PendingInterrupt>,

    /// Latest checkpoint, when a checkpointer is configured
    pub config: Option<CheckpointConfig>,
}

impl RunOutcome {
    /// Nodes suspended via `interrupt()`
    pub fn is_interrupted(&self) -> bool {
        !self.interrupts.is_empty()
    }

    /// Stopped before reaching the end (interrupt or breakpoint)
    pub fn is_paused(&self) -> bool {
        !self.next.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.next.is_empty()
    }
}

/// Point-in-time view of a thread
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub values: Value,
    pub next: Vec<NodeId>,
    pub interrupts: Vec<PendingInterrupt>,
    pub config: CheckpointConfig,
    pub metadata: CheckpointMetadata,
    pub created_at: DateTime<Utc>,
    pub parent_config: Option<CheckpointConfig>,
}

impl From<CheckpointTuple> for StateSnapshot {
    fn from(tuple: CheckpointTuple) -> Self {
        Self {
            values: tuple.checkpoint.values,
            next: tuple.checkpoint.next,
            interrupts: tuple.checkpoint.interrupts,
            config: tuple.config,
            metadata: tuple.metadata,
            created_at: tuple.checkpoint.ts,
            parent_config: tuple.parent_config,
        }
    }
}

/// Events emitted while a graph streams
///
/// ```text
/// TaskStart* → Message* → Updates* → Values → ... → (Interrupt) → End
/// ```
///
/// `Message` events carry partial output a node publishes with
/// [`emit_message`](crate::runtime::emit_message) while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A node started running
    TaskStart { step: i64, node: NodeId },

    /// Partial output published by a running node
    Message { step: i64, node: NodeId, chunk: Value },

    /// A node's update was applied
    Updates { step: i64, node: NodeId, update: Value },

    /// Full state after a step
    Values { step: i64, values: Value },

    /// Nodes suspended
    Interrupt { interrupts: Vec<PendingInterrupt> },

    /// The invocation returned
    End { outcome: RunOutcome },
}

/// Stream of execution events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Stream of historical snapshots, newest first
pub type StateSnapshotStream = Pin<Box<dyn Stream<Item = Result<StateSnapshot>> + Send>>;
