//! # waypoint-prebuilt - Tool-calling agent with human review
//!
//! Building blocks for an assistant that calls tools, where calls to
//! **protected** tools pause the thread until a person decides what to do:
//!
//! - **[Messages](messages)** - conversation records and the `messages` reducer
//! - **[Tools](tools)** - the [`Tool`] trait and [`ToolRegistry`]
//! - **[`ToolNode`]** - runs the tool calls of the latest assistant message
//! - **[Review](review)** - routing policy and the [`HumanReviewNode`]
//! - **[`ResumeValidator`]** - JSON-schema checks for human answers
//! - **[`create_reviewed_agent`]** - wires all of the above into a graph
//!
//! # Review flow
//!
//! A run that hits a protected tool call comes back interrupted. The
//! interrupt payload is a [`ReviewRequest`]:
//!
//! ```json
//! {"message": "Your input is required for the following tool:",
//!  "tool_call": {"id": "call_1", "name": "delete_file", "args": {"path": "/tmp/x"}}}
//! ```
//!
//! Resume the thread with `Command::resume(json!({"action": .., "data": ..}))`:
//!
//! | action     | data                 | effect                                   |
//! |------------|----------------------|------------------------------------------|
//! | `continue` | -                    | run the call as proposed                 |
//! | `update`   | new args (JSON text) | run the call with replaced arguments     |
//! | `feedback` | text                 | answer the call with `data`, back to the model |
//! | `reject`   | optional reason      | refuse the call, back to the model       |
//!
//! A missing or unknown action is treated as `continue`; `reject` is always
//! recognized and never runs the call.
//!
//! # Policy
//!
//! [`ReviewPolicy`] lists protected tool names and a `yolo_mode` switch that
//! disables review. State fields `protected_tools` and `yolo_mode` override
//! the policy per thread.

pub mod agent;
pub mod error;
pub mod messages;
pub mod review;
pub mod tool_node;
pub mod tools;
pub mod validation;

pub use agent::{create_reviewed_agent, create_reviewed_agent_with, AgentConfig, ChatModel, MessageStream};
pub use error::{PrebuiltError, Result};
pub use messages::{
    messages_from_state, messages_update, Message, MessageType, MessagesReducer, ToolCall,
    MESSAGES_KEY,
};
pub use review::{
    route_assistant, HumanReviewNode, ReviewAction, ReviewPolicy, ReviewRequest, ReviewResponse,
    ASSISTANT_NODE, REVIEW_NODE, TOOLS_NODE,
};
pub use tool_node::ToolNode;
pub use tools::{Tool, ToolMetadata, ToolRegistry};
pub use validation::ResumeValidator;
