//! Commands: routing from nodes, resume directives from callers
//!
//! A [`Command`] plays two roles:
//!
//! **As node output** it carries a state update and a `goto` routing
//! directive, letting a node decide where control flows next:
//!
//! ```rust
//! use waypoint_core::Command;
//! use serde_json::json;
//!
//! let cmd = Command::new()
//!     .with_update(json!({"status": "approved"}))
//!     .with_goto("tools");
//! ```
//!
//! **As graph input** it resumes a paused thread. `resume` answers the
//! pending suspension request(s), `update` edits state before continuing and
//! `goto` redirects control flow, abandoning the pending work:
//!
//! ```rust
//! use waypoint_core::Command;
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! // Exactly one pending interrupt
//! let cmd = Command::resume(json!({"action": "continue"}));
//!
//! // Several pending interrupts, answered by id
//! let mut answers = HashMap::new();
//! answers.insert("3f2a...".to_string(), json!(true));
//! let cmd = Command::resume_map(answers);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Navigation target for the goto field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GotoTarget {
    /// Single node name
    Node(String),
    /// Several nodes, run concurrently in the next step
    Nodes(Vec<String>),
}

impl GotoTarget {
    /// Target node names in order
    pub fn nodes(&self) -> Vec<String> {
        match self {
            GotoTarget::Node(node) => vec![node.clone()],
            GotoTarget::Nodes(nodes) => nodes.clone(),
        }
    }
}

impl From<String> for GotoTarget {
    fn from(node: String) -> Self {
        GotoTarget::Node(node)
    }
}

impl From<&str> for GotoTarget {
    fn from(node: &str) -> Self {
        GotoTarget::Node(node.to_string())
    }
}

impl From<Vec<String>> for GotoTarget {
    fn from(nodes: Vec<String>) -> Self {
        GotoTarget::Nodes(nodes)
    }
}

impl From<Vec<&str>> for GotoTarget {
    fn from(nodes: Vec<&str>) -> Self {
        GotoTarget::Nodes(nodes.into_iter().map(String::from).collect())
    }
}

/// Resume value for pending interrupts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResumeValue {
    /// Answer the only pending interrupt
    Single(Value),
    /// Answer interrupts by id
    ByInterruptId(HashMap<String, Value>),
}

impl From<Value> for ResumeValue {
    fn from(value: Value) -> Self {
        ResumeValue::Single(value)
    }
}

impl From<HashMap<String, Value>> for ResumeValue {
    fn from(map: HashMap<String, Value>) -> Self {
        ResumeValue::ByInterruptId(map)
    }
}

/// Update + routing directive
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Command {
    /// Partial state update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,

    /// Value(s) answering pending interrupts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<ResumeValue>,

    /// Nodes to run next
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<GotoTarget>,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume the single pending interrupt with `value`
    pub fn resume(value: Value) -> Self {
        Self::new().with_resume(value)
    }

    /// Resume interrupts by id
    pub fn resume_map(values: HashMap<String, Value>) -> Self {
        Self::new().with_resume(values)
    }

    /// Redirect control flow to `target`
    pub fn goto(target: impl Into<GotoTarget>) -> Self {
        Self::new().with_goto(target)
    }

    /// Merge `values` into state
    pub fn update(values: Value) -> Self {
        Self::new().with_update(values)
    }

    pub fn with_update(mut self, update: Value) -> Self {
        self.update = Some(update);
        self
    }

    pub fn with_resume(mut self, resume: impl Into<ResumeValue>) -> Self {
        self.resume = Some(resume.into());
        self
    }

    pub fn with_goto(mut self, goto: impl Into<GotoTarget>) -> Self {
        self.goto = Some(goto.into());
        self
    }

    /// Check if the command carries nothing
    pub fn is_empty(&self) -> bool {
        self.update.is_none() && self.resume.is_none() && self.goto.is_none()
    }

    /// goto targets, empty when no goto was given
    pub fn goto_nodes(&self) -> Vec<String> {
        self.goto.as_ref().map(GotoTarget::nodes).unwrap_or_default()
    }
}
