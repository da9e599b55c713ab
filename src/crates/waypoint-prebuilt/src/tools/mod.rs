//! Tools callable by agents
//!
//! A [`Tool`] takes JSON arguments and returns a JSON result. Tools are
//! collected in a [`ToolRegistry`], which the [`ToolNode`](crate::ToolNode)
//! uses to run the calls an assistant message requests.
//!
//! ```rust
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use waypoint_prebuilt::{Result, Tool, ToolRegistry};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Tool for Echo {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Return the arguments unchanged"
//!     }
//!
//!     async fn execute(&self, input: Value) -> Result<Value> {
//!         Ok(input)
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Echo);
//! assert_eq!(registry.list_tools(), vec!["echo"]);
//! ```
//!
//! When [`Tool::input_schema`] returns a schema, arguments are checked
//! against it before [`Tool::execute`] runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{PrebuiltError, Result};
use crate::validation::validate_against_schema;

/// An action an agent can take
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call this tool
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the arguments, if any
    fn input_schema(&self) -> Option<Value> {
        None
    }

    async fn execute(&self, input: Value) -> Result<Value>;

    /// Check arguments before execution
    fn validate_input(&self, input: &Value) -> Result<()> {
        match self.input_schema() {
            Some(schema) => validate_against_schema(input, &schema),
            None => Ok(()),
        }
    }
}

/// Description of a tool as offered to a chat model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl ToolMetadata {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        }
    }
}

/// Tools by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn list_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Metadata for every tool, sorted by name
    pub fn list_metadata(&self) -> Vec<ToolMetadata> {
        self.list_tools()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolMetadata::from_tool(tool.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate `input` and run the named tool
    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| PrebuiltError::ToolNotFound(name.to_string()))?;
        tool.validate_input(&input)?;
        debug!(tool = name, "Executing tool");
        tool.execute(input).await
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_tools())
            .finish()
    }
}
