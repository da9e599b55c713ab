//! Chat messages and the `messages` state field
//!
//! Agent state keeps the conversation under `messages` as a JSON array of
//! [`Message`]s. [`MessagesReducer`] merges node updates into it:
//!
//! - messages without an `id` get a fresh one and are appended
//! - a message whose `id` is already present **replaces** that message in
//!   place (used by the review node to rewrite tool-call arguments)
//!
//! ```rust
//! use waypoint_core::Reducer;
//! use waypoint_prebuilt::{Message, MessagesReducer};
//! use serde_json::json;
//!
//! let reducer = MessagesReducer;
//! let state = reducer
//!     .reduce(&json!(null), &json!([Message::human("hi").with_id("m1")]))
//!     .unwrap();
//! let state = reducer
//!     .reduce(&state, &json!([Message::human("hello").with_id("m1")]))
//!     .unwrap();
//!
//! assert_eq!(state.as_array().unwrap().len(), 1);
//! assert_eq!(state[0]["content"], "hello");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use waypoint_core::Reducer;

use crate::error::{PrebuiltError, Result};

/// State field holding the conversation
pub const MESSAGES_KEY: &str = "messages";

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique identifier, echoed by the tool's response message
    pub id: String,

    pub name: String,

    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Human,
    AI,
    System,
    Tool,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,

    pub content: String,

    /// Assigned by [`MessagesReducer`] when missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Tool name, for tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Call being answered, for tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Calls requested by an AI message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn new(message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            message_type,
            content: content.into(),
            id: None,
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageType::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageType::AI, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageType::System, content)
    }

    /// Response to the tool call `tool_call_id`
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(MessageType::Tool, content)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn is_ai(&self) -> bool {
        self.message_type == MessageType::AI
    }

    pub fn is_tool(&self) -> bool {
        self.message_type == MessageType::Tool
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Read the conversation out of a state object; a missing field is empty
pub fn messages_from_state(state: &Value) -> Result<Vec<Message>> {
    match state.get(MESSAGES_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(messages) => serde_json::from_value(messages.clone())
            .map_err(|e| PrebuiltError::MessageParsing(e.to_string())),
    }
}

/// Partial state update appending (or replacing) messages
pub fn messages_update(messages: Vec<Message>) -> Result<Value> {
    let mut update = serde_json::Map::new();
    update.insert(MESSAGES_KEY.to_string(), serde_json::to_value(messages)?);
    Ok(Value::Object(update))
}

/// Append-or-replace-by-id reducer for message lists
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagesReducer;

impl Reducer for MessagesReducer {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String> {
        let mut merged = match current {
            Value::Null => Vec::new(),
            Value::Array(items) => items.clone(),
            _ => return Err("messages must be an array".to_string()),
        };
        let incoming = match update {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            single => vec![single.clone()],
        };

        for mut message in incoming {
            let Value::Object(fields) = &mut message else {
                return Err("each message must be an object".to_string());
            };
            let id = match fields.get("id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    let id = Uuid::new_v4().to_string();
                    fields.insert("id".to_string(), Value::String(id.clone()));
                    id
                }
            };

            match merged.iter().position(|m| m.get("id").and_then(Value::as_str) == Some(id.as_str())) {
                Some(index) => merged[index] = message,
                None => merged.push(message),
            }
        }
        Ok(Value::Array(merged))
    }

    fn name(&self) -> &str {
        "messages"
    }
}
