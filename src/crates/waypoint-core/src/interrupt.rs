//! Suspension: inline interrupts and static breakpoints
//!
//! # Inline interrupts
//!
//! [`interrupt`] halts the running node and hands a payload to the caller.
//! The caller answers with a [`Command::resume`](crate::Command::resume) on
//! the same thread; the engine then **re-runs the node from its start**, and
//! this time the same `interrupt` call returns the resume value.
//!
//! ```rust,ignore
//! graph.add_node("approve", |state| Box::pin(async move {
//!     // Runs again on resume; keep it idempotent.
//!     let draft = state["draft"].clone();
//!
//!     let answer = interrupt(json!({"question": "ship it?", "draft": draft}))?;
//!     Ok(json!({"approved": answer == json!("yes")}))
//! }));
//! ```
//!
//! A node may call `interrupt` several times. Each call returns the resume
//! value recorded for its interrupt id; the first unanswered call suspends
//! again. Answering the same id twice keeps the later value, so a node that
//! failed on a bad answer can be resumed with a corrected one.
//!
//! Interrupt ids are derived from (thread, step, node, call index), so a
//! re-executed node produces the same id for the same call.
//!
//! # Static breakpoints
//!
//! [`InterruptConfig`] pauses the run before or after named nodes without
//! any code inside them. Resuming with an empty command (or `Value::Null`)
//! continues past the breakpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;
use waypoint_checkpoint::PendingInterrupt;

use crate::error::{GraphError, Result};
use crate::graph::NodeId;
use crate::runtime::with_node_context;

/// Suspend the current node with `value` as the payload for the caller
///
/// Returns the recorded resume value when the node is being re-run after a
/// resume. Otherwise returns [`GraphError::Interrupt`], which the node must
/// propagate with `?`. Called outside a node it returns
/// [`GraphError::Execution`].
pub fn interrupt(value: Value) -> Result<Value> {
    with_node_context(move |ctx| {
        let index = ctx.next_call();
        let id = interrupt_id(ctx.thread_id(), ctx.step(), ctx.node(), index);
        if let Some(resume) = ctx.resume_value(&id) {
            debug!(node = ctx.node(), index, "Interrupt answered from recorded resume value");
            return Ok(resume.clone());
        }

        Err(GraphError::Interrupt(PendingInterrupt::new(id, ctx.node(), value)))
    })
    .unwrap_or_else(|| {
        Err(GraphError::Execution(
            "interrupt() called outside of a graph node".to_string(),
        ))
    })
}

/// Deterministic interrupt id for a suspension call
pub fn interrupt_id(thread_id: &str, step: i64, node: &str, index: usize) -> String {
    let name = format!("{}|{}|{}|{}", thread_id, step, node, index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Static breakpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InterruptConfig {
    /// Nodes to pause before
    #[serde(default)]
    pub interrupt_before: Vec<NodeId>,

    /// Nodes to pause after
    #[serde(default)]
    pub interrupt_after: Vec<NodeId>,

    /// Pause before every node
    #[serde(default)]
    pub interrupt_before_all: bool,

    /// Pause after every node
    #[serde(default)]
    pub interrupt_after_all: bool,
}

impl InterruptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interrupt_before(mut self, nodes: Vec<NodeId>) -> Self {
        self.interrupt_before = nodes;
        self
    }

    pub fn with_interrupt_after(mut self, nodes: Vec<NodeId>) -> Self {
        self.interrupt_after = nodes;
        self
    }

    pub fn with_interrupt_before_all(mut self) -> Self {
        self.interrupt_before_all = true;
        self
    }

    pub fn with_interrupt_after_all(mut self) -> Self {
        self.interrupt_after_all = true;
        self
    }

    pub fn should_interrupt_before(&self, node: &str) -> bool {
        self.interrupt_before_all || self.interrupt_before.iter().any(|n| n == node)
    }

    pub fn should_interrupt_after(&self, node: &str) -> bool {
        self.interrupt_after_all || self.interrupt_after.iter().any(|n| n == node)
    }

    /// Whether no breakpoint is configured
    pub fn is_empty(&self) -> bool {
        !self.interrupt_before_all
            && !self.interrupt_after_all
            && self.interrupt_before.is_empty()
            && self.interrupt_after.is_empty()
    }
}
