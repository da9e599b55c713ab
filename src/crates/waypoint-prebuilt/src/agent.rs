//! Tool-calling assistant whose protected tool calls wait for a human
//!
//! ```rust,ignore
//! let app = create_reviewed_agent(
//!     Arc::new(my_model),
//!     registry,
//!     ReviewPolicy::new().protect("delete_file"),
//!     CompileOptions::new().with_checkpointer(Arc::new(InMemoryCheckpointSaver::new())),
//! )?;
//!
//! let config = RunConfig::for_thread("session-1");
//! let outcome = app.invoke(messages_update(vec![Message::human("tidy up /tmp")])?, &config).await?;
//! if outcome.is_interrupted() {
//!     // outcome.interrupts[0].value is a ReviewRequest
//!     app.invoke(Command::resume(json!({"action": "continue"})), &config).await?;
//! }
//! ```
//!
//! When the run is consumed through `CompiledGraph::stream`, every chunk the
//! model yields is forwarded as a `StreamEvent::Message` before the assistant
//! node's update.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use waypoint_core::{emit_message, CompileOptions, CompiledGraph, StateGraph, START};

use crate::error::Result;
use crate::messages::{messages_from_state, messages_update, Message, MessagesReducer, MESSAGES_KEY};
use crate::review::{route_assistant, HumanReviewNode, ReviewPolicy, ASSISTANT_NODE, REVIEW_NODE, TOOLS_NODE};
use crate::tool_node::ToolNode;
use crate::tools::{ToolMetadata, ToolRegistry};

/// Chunks of one assistant reply
pub type MessageStream = BoxStream<'static, Result<Message>>;

/// A chat model able to request tool calls
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce the next assistant message for the conversation
    async fn invoke(&self, messages: &[Message], tools: &[ToolMetadata]) -> Result<Message>;

    /// Produce the next assistant message as chunks.
    ///
    /// Chunk contents are concatenated and their tool calls collected into
    /// the stored reply. The default yields the whole [`invoke`](Self::invoke)
    /// result as a single chunk.
    async fn stream(&self, messages: &[Message], tools: &[ToolMetadata]) -> Result<MessageStream> {
        let reply = self.invoke(messages, tools).await?;
        Ok(stream::once(async move { Ok(reply) }).boxed())
    }
}

/// Settings of the assistant side of a reviewed agent
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    review: HumanReviewNode,
    system_prompt: Option<String>,
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_review(mut self, review: HumanReviewNode) -> Self {
        self.review = review;
        self
    }

    /// Sent to the model ahead of the conversation, never stored in state
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Build the assistant → (review) → tools → assistant graph
pub fn create_reviewed_agent(
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    policy: ReviewPolicy,
    options: CompileOptions,
) -> waypoint_core::Result<CompiledGraph> {
    create_reviewed_agent_with(model, tools, policy, AgentConfig::new(), options)
}

/// Same as [`create_reviewed_agent`] with a review node and system prompt
pub fn create_reviewed_agent_with(
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    policy: ReviewPolicy,
    config: AgentConfig,
    options: CompileOptions,
) -> waypoint_core::Result<CompiledGraph> {
    let AgentConfig { review, system_prompt } = config;
    let system = Arc::new(system_prompt.map(Message::system));
    let tool_node = ToolNode::new(tools);
    let metadata = Arc::new(tool_node.registry().list_metadata());

    let mut graph = StateGraph::new();
    graph.add_field(MESSAGES_KEY, MessagesReducer);

    graph.add_node(ASSISTANT_NODE, move |state: Value| {
        let model = Arc::clone(&model);
        let metadata = Arc::clone(&metadata);
        let system = Arc::clone(&system);
        Box::pin(async move {
            let mut messages = messages_from_state(&state)?;
            if let Some(system) = system.as_ref() {
                messages.insert(0, system.clone());
            }
            debug!(messages = messages.len(), "Calling chat model");
            let reply = stream_reply(model.as_ref(), &messages, &metadata).await?;
            Ok(messages_update(vec![reply])?)
        })
    });

    graph.add_command_node(REVIEW_NODE, move |state: Value| {
        let review = review.clone();
        Box::pin(async move { Ok(review.review(state).await?) })
    });

    graph.add_node(TOOLS_NODE, move |state: Value| {
        let tool_node = tool_node.clone();
        Box::pin(async move { Ok(tool_node.execute(state).await?) })
    });

    graph
        .add_edge(START, ASSISTANT_NODE)
        .add_conditional_edges(
            ASSISTANT_NODE,
            move |state: &Value| route_assistant(state, &policy),
            None,
        )
        .add_edge(TOOLS_NODE, ASSISTANT_NODE);

    graph.compile_with(options)
}

/// Forward each chunk to the run's event stream and assemble the reply
async fn stream_reply(
    model: &dyn ChatModel,
    messages: &[Message],
    tools: &[ToolMetadata],
) -> Result<Message> {
    let mut chunks = model.stream(messages, tools).await?;
    let mut reply = Message::ai("");
    let mut count = 0usize;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        emit_message(serde_json::to_value(&chunk)?).await;
        reply.content.push_str(&chunk.content);
        reply.tool_calls.extend(chunk.tool_calls);
        if chunk.id.is_some() {
            reply.id = chunk.id;
        }
        count += 1;
    }
    debug!(chunks = count, "Model reply assembled");
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ToolCall;
    use serde_json::json;

    struct Chunked(Vec<Message>);

    #[async_trait]
    impl ChatModel for Chunked {
        async fn invoke(&self, _: &[Message], _: &[ToolMetadata]) -> Result<Message> {
            Ok(Message::ai("unused"))
        }

        async fn stream(&self, _: &[Message], _: &[ToolMetadata]) -> Result<MessageStream> {
            Ok(stream::iter(self.0.clone().into_iter().map(Ok)).boxed())
        }
    }

    struct Whole;

    #[async_trait]
    impl ChatModel for Whole {
        async fn invoke(&self, _: &[Message], _: &[ToolMetadata]) -> Result<Message> {
            Ok(Message::ai("done").with_tool_calls(vec![ToolCall::new("c1", "read_file", json!({}))]))
        }
    }

    #[tokio::test]
    async fn test_chunks_assemble_into_reply() {
        let model = Chunked(vec![
            Message::ai("Hel"),
            Message::ai("lo").with_tool_calls(vec![ToolCall::new("c1", "read_file", json!({}))]),
        ]);
        let reply = stream_reply(&model, &[], &[]).await.unwrap();
        assert_eq!(reply.content, "Hello");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.message_type, crate::messages::MessageType::AI);
    }

    #[tokio::test]
    async fn test_default_stream_is_single_invoke_chunk() {
        let chunks: Vec<Message> = Whole
            .stream(&[], &[])
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "done");

        let reply = stream_reply(&Whole, &[], &[]).await.unwrap();
        assert_eq!(reply.tool_calls[0].name, "read_file");
    }
}
