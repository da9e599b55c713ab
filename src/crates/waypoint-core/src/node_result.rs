//! What a node returns

use crate::command::Command;
use serde_json::Value;

/// Output of a node
///
/// Nodes either return a partial state update, merged into the graph state
/// through the schema reducers, or a [`Command`] that also decides where
/// control flows next.
///
/// ```rust
/// use waypoint_core::{Command, NodeOutput};
/// use serde_json::json;
///
/// let plain = NodeOutput::Update(json!({"count": 1}));
/// let routed = NodeOutput::Command(Command::goto("review"));
/// assert!(!plain.has_goto());
/// assert!(routed.has_goto());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    /// Partial state update
    Update(Value),

    /// Update plus routing
    Command(Command),
}

impl NodeOutput {
    /// The state update carried by this output, if any
    pub fn update(&self) -> Option<&Value> {
        match self {
            NodeOutput::Update(value) => Some(value),
            NodeOutput::Command(cmd) => cmd.update.as_ref(),
        }
    }

    pub fn has_goto(&self) -> bool {
        matches!(self, NodeOutput::Command(cmd) if cmd.goto.is_some())
    }

    /// Convert into a Command, creating one if needed
    pub fn into_command(self) -> Command {
        match self {
            NodeOutput::Update(value) if value.is_null() => Command::new(),
            NodeOutput::Update(value) => Command::new().with_update(value),
            NodeOutput::Command(cmd) => cmd,
        }
    }
}

impl From<Value> for NodeOutput {
    fn from(value: Value) -> Self {
        NodeOutput::Update(value)
    }
}

impl From<Command> for NodeOutput {
    fn from(cmd: Command) -> Self {
        NodeOutput::Command(cmd)
    }
}
