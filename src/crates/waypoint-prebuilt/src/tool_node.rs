//! Graph node running the tool calls of the latest assistant message
//!
//! ```text
//! messages: [.., {type: "ai", tool_calls: [c1, c2]}]
//!                         │
//!                         ↓ ToolNode::execute   (c1 and c2 run concurrently)
//! messages: [.., {type: "tool", tool_call_id: c1}, {type: "tool", tool_call_id: c2}]
//! ```
//!
//! Results are returned in call order. With error handling on (the
//! default) a failing tool produces an error message the model can read;
//! with it off the first failure fails the node.

use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::error::{PrebuiltError, Result};
use crate::messages::{messages_from_state, messages_update, Message, ToolCall};
use crate::tools::ToolRegistry;

#[derive(Clone, Debug)]
pub struct ToolNode {
    registry: Arc<ToolRegistry>,
    handle_tool_errors: bool,
}

impl ToolNode {
    pub fn new(registry: ToolRegistry) -> Self {
        Self::from_shared(Arc::new(registry))
    }

    pub fn from_shared(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            handle_tool_errors: true,
        }
    }

    /// Turn tool failures into error messages (default) or node errors
    pub fn with_error_handling(mut self, handle_errors: bool) -> Self {
        self.handle_tool_errors = handle_errors;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the tool calls of the last AI message and return tool messages
    pub async fn execute(&self, state: Value) -> Result<Value> {
        let messages = messages_from_state(&state)?;
        let calls = messages
            .iter()
            .rev()
            .find(|m| m.is_ai())
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default();

        if calls.is_empty() {
            return messages_update(Vec::new());
        }

        let runs = calls.into_iter().map(|call| {
            let registry = Arc::clone(&self.registry);
            async move {
                let result = registry.execute(&call.name, call.args.clone()).await;
                (call, result)
            }
        });

        let mut replies = Vec::new();
        for (call, result) in join_all(runs).await {
            let content = match result {
                Ok(value) => render(&value),
                Err(e) if self.handle_tool_errors => {
                    warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                    render(&json!({"error": e.to_string(), "status": "error"}))
                }
                Err(e) => {
                    return Err(PrebuiltError::ToolExecution(format!(
                        "{} ({}): {}",
                        call.name, call.id, e
                    )))
                }
            };
            replies.push(reply(&call, content));
        }
        messages_update(replies)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn reply(call: &ToolCall, content: String) -> Message {
    Message::tool(content, call.id.clone()).with_name(call.name.clone())
}
