//! Human review of protected tool calls
//!
//! The reviewed agent graph looks like this:
//!
//! ```text
//! START → assistant ──(no tool calls)──────────────→ END
//!             │  ↑ ──(unprotected calls or yolo)──→ tools ─┐
//!             │  └──────────────────────────────────────────┘
//!             └─(protected call)→ human_tool_review ──continue/update──→ tools
//!                                        └────────feedback/reject──────→ assistant
//! ```
//!
//! [`route_assistant`] decides where the assistant's turn goes.
//! [`HumanReviewNode`] suspends with a [`ReviewRequest`] and acts on the
//! [`ReviewResponse`] the caller resumes with.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use waypoint_core::{interrupt, Command, END};

use crate::error::{PrebuiltError, Result};
use crate::messages::{messages_from_state, messages_update, Message, ToolCall};
use crate::validation::ResumeValidator;

pub const ASSISTANT_NODE: &str = "assistant";
pub const REVIEW_NODE: &str = "human_tool_review";
pub const TOOLS_NODE: &str = "tools";

/// Prompt shown with every review request
pub const REVIEW_PROMPT: &str = "Your input is required for the following tool:";

/// Which tool calls need a human decision
///
/// State fields `protected_tools` and `yolo_mode`, when present, take
/// precedence over the policy so a caller can change them per thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewPolicy {
    #[serde(default)]
    pub protected_tools: Vec<String>,

    /// Skip review entirely
    #[serde(default)]
    pub yolo_mode: bool,
}

impl ReviewPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protect(mut self, tool: impl Into<String>) -> Self {
        self.protected_tools.push(tool.into());
        self
    }

    pub fn with_yolo_mode(mut self, yolo_mode: bool) -> Self {
        self.yolo_mode = yolo_mode;
        self
    }

    /// The policy in effect for `state`
    pub fn effective(&self, state: &Value) -> ReviewPolicy {
        let protected_tools = match state.get("protected_tools").and_then(Value::as_array) {
            Some(names) => names
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            None => self.protected_tools.clone(),
        };
        let yolo_mode = state
            .get("yolo_mode")
            .and_then(Value::as_bool)
            .unwrap_or(self.yolo_mode);
        ReviewPolicy {
            protected_tools,
            yolo_mode,
        }
    }

    pub fn requires_review(&self, calls: &[ToolCall]) -> bool {
        !self.yolo_mode
            && calls
                .iter()
                .any(|call| self.protected_tools.iter().any(|p| p == &call.name))
    }
}

/// Route after the assistant: review, tools or [`END`]
pub fn route_assistant(state: &Value, policy: &ReviewPolicy) -> &'static str {
    let last = match messages_from_state(state) {
        Ok(mut messages) => messages.pop(),
        Err(e) => {
            warn!(error = %e, "Unreadable messages, ending run");
            None
        }
    };
    match last {
        Some(message) if message.is_ai() && message.has_tool_calls() => {
            if policy.effective(state).requires_review(&message.tool_calls) {
                REVIEW_NODE
            } else {
                TOOLS_NODE
            }
        }
        _ => END,
    }
}

/// Payload of the review suspension
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRequest {
    pub message: String,
    pub tool_call: ToolCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    /// Run the tool call as proposed
    Continue,
    /// Run it with replaced arguments
    Update,
    /// Answer the call with a message instead of running it
    Feedback,
    /// Refuse the call and tell the model why.
    ///
    /// Recognized on its own rather than falling through to continue like an
    /// unknown action, so a rejected call never runs.
    Reject,
}

impl ReviewAction {
    /// Unknown or missing actions mean continue
    pub fn parse(action: Option<&str>) -> Self {
        match action {
            Some("update") => ReviewAction::Update,
            Some("feedback") => ReviewAction::Feedback,
            Some("reject") => ReviewAction::Reject,
            Some("continue") | None => ReviewAction::Continue,
            Some(other) => {
                warn!(action = other, "Unknown review action, continuing");
                ReviewAction::Continue
            }
        }
    }
}

/// Decision supplied as the resume value
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewResponse {
    pub action: ReviewAction,
    pub data: Option<Value>,
}

impl ReviewResponse {
    pub fn from_value(value: &Value) -> Self {
        let data = match value.get("data") {
            None | Some(Value::Null) => None,
            Some(data) => Some(data.clone()),
        };
        Self {
            action: ReviewAction::parse(value.get("action").and_then(Value::as_str)),
            data,
        }
    }
}

/// Suspends on the last tool call and applies the reviewer's decision
#[derive(Debug, Clone, Default)]
pub struct HumanReviewNode {
    validator: Option<ResumeValidator>,
}

impl HumanReviewNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check resume values before acting on them
    pub fn with_validator(mut self, validator: ResumeValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub async fn review(&self, state: Value) -> Result<Command> {
        let mut messages = messages_from_state(&state)?;
        let (last, call) = match messages.pop() {
            Some(message) if message.is_ai() => match message.tool_calls.last().cloned() {
                Some(call) => (message, call),
                None => return Err(no_pending_calls()),
            },
            _ => return Err(no_pending_calls()),
        };

        let request = ReviewRequest {
            message: REVIEW_PROMPT.to_string(),
            tool_call: call.clone(),
        };
        let answer = interrupt(serde_json::to_value(&request)?)?;
        let answer = match &self.validator {
            Some(validator) => validator.validate(answer)?,
            None => answer,
        };
        let response = ReviewResponse::from_value(&answer);
        info!(tool = %call.name, call_id = %call.id, action = ?response.action, "Tool call reviewed");

        match response.action {
            ReviewAction::Continue => Ok(Command::goto(TOOLS_NODE)),
            ReviewAction::Update => {
                let data = require_data(response.data, "update")?;
                let args = parse_args(data)?;
                let revised = with_last_call_args(last, args);
                Ok(Command::goto(TOOLS_NODE).with_update(messages_update(vec![revised])?))
            }
            ReviewAction::Feedback => {
                let data = require_data(response.data, "feedback")?;
                let reply = Message::tool(text_of(data), call.id.clone()).with_name(call.name);
                Ok(Command::goto(ASSISTANT_NODE).with_update(messages_update(vec![reply])?))
            }
            ReviewAction::Reject => {
                let mut content = format!("The user rejected the `{}` tool call.", call.name);
                if let Some(reason) = response.data {
                    content.push_str(" Reason: ");
                    content.push_str(&text_of(reason));
                }
                let reply = Message::tool(content, call.id.clone()).with_name(call.name);
                Ok(Command::goto(ASSISTANT_NODE).with_update(messages_update(vec![reply])?))
            }
        }
    }
}

fn no_pending_calls() -> PrebuiltError {
    PrebuiltError::InvalidReview("review requested without pending tool calls".to_string())
}

fn require_data(data: Option<Value>, action: &str) -> Result<Value> {
    data.ok_or_else(|| PrebuiltError::InvalidReview(format!("{action} action requires data")))
}

/// Arguments arrive as JSON text from most UIs; objects are taken as-is
fn parse_args(data: Value) -> Result<Value> {
    match data {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| PrebuiltError::InvalidReview(format!("update data is not JSON: {e}"))),
        other => Ok(other),
    }
}

fn text_of(data: Value) -> String {
    match data {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Same message (and id) with the last call's arguments replaced
fn with_last_call_args(mut message: Message, args: Value) -> Message {
    if let Some(call) = message.tool_calls.last_mut() {
        call.args = args;
    }
    message
}
