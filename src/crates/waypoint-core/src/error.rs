//! Error types for graph construction and execution
//!
//! ```text
//! GraphError
//! ├── Validation      - graph structure errors found at compile time
//! ├── NodeExecution   - a node returned an error
//! ├── Execution       - engine errors without node context
//! ├── Interrupt       - a node suspended (never escapes invoke)
//! ├── InvalidResume   - a resume directive does not match the paused thread
//! ├── RecursionLimit  - too many steps in one invocation
//! ├── State           - reducer / state shape errors
//! ├── Checkpoint      - persistence errors
//! ├── Serialization   - JSON / YAML / TOML errors
//! ├── Configuration   - bad configuration or missing checkpointer
//! └── Io
//! ```
//!
//! Suspension travels through the same `Result` channel as failures so a node
//! can write `interrupt(payload)?` and let the engine catch it:
//!
//! ```rust,ignore
//! use waypoint_core::{interrupt, GraphError};
//!
//! let approval = interrupt(json!({"question": "deploy?"}))?;
//! ```

use thiserror::Error;
use waypoint_checkpoint::{CheckpointError, PendingInterrupt};

use crate::state::StateError;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Error type for all graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    ///
    /// Raised by `compile()` when the entry point is missing, a node name is
    /// reserved or duplicated, or an edge references an unknown node.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A node's function returned an error
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Error message from node execution
        error: String,
    },

    /// Execution error without node context
    #[error("Execution failed: {0}")]
    Execution(String),

    /// A node called [`interrupt`](crate::interrupt::interrupt) and is waiting
    /// for a resume value
    ///
    /// This is **not a failure**. The engine converts it into a paused
    /// [`RunOutcome`](crate::RunOutcome); callers of `invoke` never see it.
    #[error("Execution suspended at node '{}' (interrupt {})", .0.node, .0.id)]
    Interrupt(PendingInterrupt),

    /// The resume directive does not fit the paused thread
    #[error("Invalid resume: {0}")]
    InvalidResume(String),

    /// The invocation ran more steps than allowed
    #[error("Recursion limit of {limit} steps reached without hitting a stop condition")]
    RecursionLimit {
        /// The limit that was exceeded
        limit: usize,
    },

    /// State update could not be applied
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// JSON serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing failed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Create a node execution error
    pub fn node_execution(node: impl Into<String>, error: impl std::fmt::Display) -> Self {
        GraphError::NodeExecution {
            node: node.into(),
            error: error.to_string(),
        }
    }

    /// Whether this error is a suspension rather than a failure
    pub fn is_interrupt(&self) -> bool {
        matches!(self, GraphError::Interrupt(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_execution_message() {
        let err = GraphError::node_execution("assistant", "model unavailable");
        assert_eq!(
            err.to_string(),
            "Node 'assistant' execution failed: model unavailable"
        );
        assert!(!err.is_interrupt());
    }

    #[test]
    fn test_interrupt_message_names_node() {
        let err = GraphError::Interrupt(PendingInterrupt::new("abc", "review", json!({})));
        assert!(err.is_interrupt());
        assert!(err.to_string().contains("review"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_checkpoint_error_converts() {
        let err: GraphError = CheckpointError::NotFound("cp-1".to_string()).into();
        assert!(matches!(err, GraphError::Checkpoint(_)));
    }
}
