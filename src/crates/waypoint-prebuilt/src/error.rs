//! Errors of the prebuilt agent components
//!
//! Suspension requests raised inside review nodes travel as
//! [`PrebuiltError::Graph`] and convert back into the original
//! [`GraphError`] when they leave a node, so the engine still sees them as
//! interrupts.

use thiserror::Error;
use waypoint_core::GraphError;

/// Result type for prebuilt operations
pub type Result<T> = std::result::Result<T, PrebuiltError>;

/// Errors that can occur in prebuilt components
#[derive(Error, Debug)]
pub enum PrebuiltError {
    /// Tool execution error
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// No tool registered under this name
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool input does not satisfy the tool's schema
    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    /// A human review response could not be applied
    #[error("Invalid review response: {0}")]
    InvalidReview(String),

    /// JSON schema could not be compiled
    #[error("Invalid schema: {0}")]
    Schema(String),

    /// State does not hold a usable message list
    #[error("Message parsing failed: {0}")]
    MessageParsing(String),

    /// Chat model call failed
    #[error("Model error: {0}")]
    Model(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error raised by the graph engine, including suspension requests
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl From<PrebuiltError> for GraphError {
    fn from(err: PrebuiltError) -> Self {
        match err {
            PrebuiltError::Graph(inner) => inner,
            other => GraphError::Execution(other.to_string()),
        }
    }
}
