//! End-to-end runs of the reviewed agent against a scripted model

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use futures::StreamExt;
use waypoint_core::{
    Command, CompileOptions, CompiledGraph, GraphError, InMemoryCheckpointSaver, RunConfig,
    RunOutcome, StreamEvent,
};
use waypoint_prebuilt::{
    create_reviewed_agent, create_reviewed_agent_with, messages_from_state, messages_update,
    AgentConfig, ChatModel, HumanReviewNode, Message, MessageType, PrebuiltError, Result, ResumeValidator,
    ReviewPolicy, ReviewRequest, Tool, ToolCall, ToolMetadata, ToolRegistry, REVIEW_NODE,
};

/// Replies with queued messages, recording the tools it was offered and
/// the conversation it was sent
struct ScriptedModel {
    replies: Mutex<VecDeque<Message>>,
    offered: Mutex<Vec<String>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            offered: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(&self, messages: &[Message], tools: &[ToolMetadata]) -> Result<Message> {
        *self.offered.lock().unwrap() = tools.iter().map(|t| t.name.clone()).collect();
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PrebuiltError::Model("script exhausted".to_string()))
    }
}

/// Records every call it receives
struct Recorder {
    name: &'static str,
    calls: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl Tool for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Records its arguments"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        self.calls.lock().unwrap().push(input.clone());
        Ok(json!({"ok": true, "path": input["path"]}))
    }
}

struct Fixture {
    app: CompiledGraph,
    deletes: Arc<Mutex<Vec<Value>>>,
    reads: Arc<Mutex<Vec<Value>>>,
    model: Arc<ScriptedModel>,
}

fn delete_request() -> Message {
    Message::ai("Removing the file").with_tool_calls(vec![ToolCall::new(
        "call_1",
        "delete_file",
        json!({"path": "/tmp/report.txt"}),
    )])
}

fn fixture(replies: Vec<Message>, policy: ReviewPolicy, review: HumanReviewNode) -> Fixture {
    fixture_with(replies, policy, AgentConfig::new().with_review(review))
}

fn fixture_with(replies: Vec<Message>, policy: ReviewPolicy, config: AgentConfig) -> Fixture {
    let deletes = Arc::new(Mutex::new(Vec::new()));
    let reads = Arc::new(Mutex::new(Vec::new()));
    let mut tools = ToolRegistry::new();
    tools
        .register(Recorder { name: "delete_file", calls: deletes.clone() })
        .register(Recorder { name: "read_file", calls: reads.clone() });

    let model = ScriptedModel::new(replies);
    let options =
        CompileOptions::new().with_checkpointer(Arc::new(InMemoryCheckpointSaver::new()));
    let app = create_reviewed_agent_with(model.clone(), tools, policy, config, options).unwrap();
    Fixture { app, deletes, reads, model }
}

fn protected() -> ReviewPolicy {
    ReviewPolicy::new().protect("delete_file")
}

async fn start(app: &CompiledGraph, config: &RunConfig) -> RunOutcome {
    let input = messages_update(vec![Message::human("clean up my reports")]).unwrap();
    app.invoke(input, config).await.unwrap()
}

fn transcript(outcome: &RunOutcome) -> Vec<Message> {
    messages_from_state(&outcome.values).unwrap()
}

#[tokio::test]
async fn test_protected_call_pauses_for_review() {
    let fx = fixture(vec![delete_request()], protected(), HumanReviewNode::new());
    let config = RunConfig::for_thread("review-pause");

    let paused = start(&fx.app, &config).await;
    assert!(paused.is_interrupted());
    assert_eq!(paused.next, vec![REVIEW_NODE]);

    let request: ReviewRequest = serde_json::from_value(paused.interrupts[0].value.clone()).unwrap();
    assert_eq!(request.message, "Your input is required for the following tool:");
    assert_eq!(request.tool_call.name, "delete_file");
    assert!(fx.deletes.lock().unwrap().is_empty());
    assert_eq!(*fx.model.offered.lock().unwrap(), vec!["delete_file", "read_file"]);
}

#[tokio::test]
async fn test_continue_runs_tool() {
    let fx = fixture(
        vec![delete_request(), Message::ai("Deleted.")],
        protected(),
        HumanReviewNode::new(),
    );
    let config = RunConfig::for_thread("review-continue");
    start(&fx.app, &config).await;

    let done = fx
        .app
        .invoke(Command::resume(json!({"action": "continue"})), &config)
        .await
        .unwrap();
    assert!(done.is_complete());
    assert_eq!(*fx.deletes.lock().unwrap(), vec![json!({"path": "/tmp/report.txt"})]);

    let messages = transcript(&done);
    let kinds: Vec<MessageType> = messages.iter().map(|m| m.message_type).collect();
    assert_eq!(
        kinds,
        vec![MessageType::Human, MessageType::AI, MessageType::Tool, MessageType::AI]
    );
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
}

#[tokio::test]
async fn test_update_replaces_arguments_in_place() {
    let fx = fixture(
        vec![delete_request(), Message::ai("Deleted the draft instead.")],
        protected(),
        HumanReviewNode::new(),
    );
    let config = RunConfig::for_thread("review-update");
    let paused = start(&fx.app, &config).await;
    let original_id = transcript(&paused)[1].id.clone();

    let done = fx
        .app
        .invoke(
            Command::resume(json!({"action": "update", "data": "{\"path\": \"/tmp/draft.txt\"}"})),
            &config,
        )
        .await
        .unwrap();
    assert!(done.is_complete());
    assert_eq!(*fx.deletes.lock().unwrap(), vec![json!({"path": "/tmp/draft.txt"})]);

    let messages = transcript(&done);
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1].id, original_id);
    assert_eq!(messages[1].tool_calls[0].args, json!({"path": "/tmp/draft.txt"}));
}

#[tokio::test]
async fn test_feedback_returns_to_assistant() {
    let fx = fixture(
        vec![delete_request(), Message::ai("Understood, I'll archive it.")],
        protected(),
        HumanReviewNode::new(),
    );
    let config = RunConfig::for_thread("review-feedback");
    start(&fx.app, &config).await;

    let done = fx
        .app
        .invoke(
            Command::resume(json!({"action": "feedback", "data": "archive it instead"})),
            &config,
        )
        .await
        .unwrap();
    assert!(done.is_complete());
    assert!(fx.deletes.lock().unwrap().is_empty());

    let messages = transcript(&done);
    assert!(messages[2].is_tool());
    assert_eq!(messages[2].content, "archive it instead");
    assert_eq!(messages[2].name.as_deref(), Some("delete_file"));
    assert_eq!(messages[3].content, "Understood, I'll archive it.");
}

#[tokio::test]
async fn test_reject_skips_tool() {
    let fx = fixture(
        vec![delete_request(), Message::ai("Leaving it alone.")],
        protected(),
        HumanReviewNode::new(),
    );
    let config = RunConfig::for_thread("review-reject");
    start(&fx.app, &config).await;

    let done = fx
        .app
        .invoke(Command::resume(json!({"action": "reject"})), &config)
        .await
        .unwrap();
    assert!(done.is_complete());
    assert!(fx.deletes.lock().unwrap().is_empty());
    assert!(transcript(&done)[2].content.contains("rejected"));
}

#[tokio::test]
async fn test_missing_action_means_continue() {
    let fx = fixture(
        vec![delete_request(), Message::ai("Deleted.")],
        protected(),
        HumanReviewNode::new(),
    );
    let config = RunConfig::for_thread("review-default");
    start(&fx.app, &config).await;

    fx.app.invoke(Command::resume(json!({})), &config).await.unwrap();
    assert_eq!(fx.deletes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_without_data_fails_node() {
    let fx = fixture(
        vec![delete_request(), Message::ai("Deleted.")],
        protected(),
        HumanReviewNode::new(),
    );
    let config = RunConfig::for_thread("review-no-data");
    start(&fx.app, &config).await;

    let err = fx
        .app
        .invoke(Command::resume(json!({"action": "update"})), &config)
        .await
        .unwrap_err();
    match err {
        GraphError::NodeExecution { node, error } => {
            assert_eq!(node, REVIEW_NODE);
            assert!(error.contains("requires data"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(fx.deletes.lock().unwrap().is_empty());

    // Retrying on the same thread uses the corrected answer
    let done = fx
        .app
        .invoke(
            Command::resume(json!({"action": "update", "data": "{\"path\": \"/tmp/draft.txt\"}"})),
            &config,
        )
        .await
        .unwrap();
    assert!(done.is_complete());
    assert_eq!(*fx.deletes.lock().unwrap(), vec![json!({"path": "/tmp/draft.txt"})]);
}

#[tokio::test]
async fn test_yolo_mode_skips_review() {
    let fx = fixture(
        vec![delete_request(), Message::ai("Deleted.")],
        protected().with_yolo_mode(true),
        HumanReviewNode::new(),
    );
    let done = start(&fx.app, &RunConfig::for_thread("review-yolo")).await;
    assert!(done.is_complete());
    assert_eq!(fx.deletes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_yolo_mode_from_state() {
    let fx = fixture(
        vec![delete_request(), Message::ai("Deleted.")],
        protected(),
        HumanReviewNode::new(),
    );
    let mut input = messages_update(vec![Message::human("clean up")]).unwrap();
    input["yolo_mode"] = json!(true);

    let done = fx
        .app
        .invoke(input, &RunConfig::for_thread("review-yolo-state"))
        .await
        .unwrap();
    assert!(done.is_complete());
    assert_eq!(fx.deletes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unprotected_tools_run_directly() {
    let read = Message::ai("").with_tool_calls(vec![ToolCall::new(
        "call_r",
        "read_file",
        json!({"path": "/etc/hosts"}),
    )]);
    let fx = fixture(
        vec![read, Message::ai("Here it is.")],
        protected(),
        HumanReviewNode::new(),
    );
    let done = start(&fx.app, &RunConfig::for_thread("review-unprotected")).await;
    assert!(done.is_complete());
    assert_eq!(fx.reads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_answer_uses_validator_fallback() {
    let validator = ResumeValidator::review_response()
        .unwrap()
        .with_fallback(json!({"action": "reject", "data": "unreadable answer"}));
    let fx = fixture(
        vec![delete_request(), Message::ai("Skipping.")],
        protected(),
        HumanReviewNode::new().with_validator(validator),
    );
    let config = RunConfig::for_thread("review-fallback");
    start(&fx.app, &config).await;

    let done = fx
        .app
        .invoke(Command::resume(json!("sure, go ahead")), &config)
        .await
        .unwrap();
    assert!(fx.deletes.lock().unwrap().is_empty());
    assert!(transcript(&done)[2].content.contains("unreadable answer"));
}

#[tokio::test]
async fn test_second_review_on_same_thread() {
    let second = Message::ai("One more").with_tool_calls(vec![ToolCall::new(
        "call_2",
        "delete_file",
        json!({"path": "/tmp/old.log"}),
    )]);
    let fx = fixture(
        vec![delete_request(), second, Message::ai("All clean.")],
        protected(),
        HumanReviewNode::new(),
    );
    let config = RunConfig::for_thread("review-twice");
    let first = start(&fx.app, &config).await;

    let again = fx
        .app
        .invoke(Command::resume(json!({"action": "continue"})), &config)
        .await
        .unwrap();
    assert!(again.is_interrupted());
    assert_ne!(again.interrupts[0].id, first.interrupts[0].id);
    assert_eq!(again.interrupts[0].value["tool_call"]["id"], "call_2");

    let done = fx
        .app
        .invoke(Command::resume(json!({"action": "continue"})), &config)
        .await
        .unwrap();
    assert!(done.is_complete());
    assert_eq!(fx.deletes.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_plain_agent_without_review_node_config() {
    let model = ScriptedModel::new(vec![Message::ai("Hello!")]);
    let app = create_reviewed_agent(
        model,
        ToolRegistry::new(),
        ReviewPolicy::new(),
        CompileOptions::new(),
    )
    .unwrap();
    let done = app
        .invoke(messages_update(vec![Message::human("hi")]).unwrap(), &RunConfig::new())
        .await
        .unwrap();
    assert!(done.is_complete());
    assert_eq!(transcript(&done).len(), 2);
}

#[tokio::test]
async fn test_system_prompt_goes_to_model_only() {
    let fx = fixture_with(
        vec![Message::ai("Hello.")],
        protected(),
        AgentConfig::new().with_system_prompt("You tidy file systems."),
    );
    let done = start(&fx.app, &RunConfig::for_thread("review-system")).await;
    assert!(done.is_complete());

    let prompts = fx.model.prompts.lock().unwrap();
    assert_eq!(prompts[0][0].message_type, MessageType::System);
    assert_eq!(prompts[0][0].content, "You tidy file systems.");
    assert_eq!(prompts[0][1].message_type, MessageType::Human);

    let stored = messages_from_state(&done.values).unwrap();
    assert!(stored.iter().all(|m| m.message_type != MessageType::System));
}

#[tokio::test]
async fn test_no_system_prompt_by_default() {
    let fx = fixture(vec![Message::ai("Hello.")], protected(), HumanReviewNode::new());
    start(&fx.app, &RunConfig::for_thread("review-plain")).await;
    let prompts = fx.model.prompts.lock().unwrap();
    assert_eq!(prompts[0][0].message_type, MessageType::Human);
}

#[tokio::test]
async fn test_streamed_run_emits_model_chunks() {
    let fx = fixture(
        vec![delete_request(), Message::ai("Deleted.")],
        protected(),
        HumanReviewNode::new(),
    );
    let config = RunConfig::for_thread("review-stream");
    let input = messages_update(vec![Message::human("Clean up /tmp")]).unwrap();

    let events: Vec<StreamEvent> = fx
        .app
        .stream(input, &config)
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    let chunks: Vec<Value> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Message { node, chunk, .. } => {
                assert_eq!(node, "assistant");
                Some(chunk.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0]["content"], "Removing the file");
    assert_eq!(chunks[0]["tool_calls"][0]["name"], "delete_file");

    let message_at = events.iter().position(|e| matches!(e, StreamEvent::Message { .. }));
    let update_at = events.iter().position(|e| matches!(e, StreamEvent::Updates { .. }));
    assert!(message_at < update_at);
}
