//! Static breakpoints, state editing, history and streaming

use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use waypoint_core::state::AppendReducer;
use waypoint_core::{
    emit_message, interrupt, CheckpointConfig, CheckpointSource, Command, CompileOptions, CompiledGraph,
    GraphError, InMemoryCheckpointSaver, RunConfig, StateGraph, StreamEvent,
};

fn pipeline() -> StateGraph {
    let mut graph = StateGraph::new();
    graph.add_field("log", AppendReducer);
    graph
        .add_node("plan", |_| Box::pin(async move { Ok(json!({"log": ["plan"]})) }))
        .add_node("apply", |_| Box::pin(async move { Ok(json!({"log": ["apply"]})) }))
        .set_entry_point("plan")
        .add_edge("plan", "apply")
        .set_finish_point("apply");
    graph
}

fn compile(graph: StateGraph, options: CompileOptions) -> CompiledGraph {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    graph.compile_with(options.with_checkpointer(saver)).unwrap()
}

async fn history(app: &CompiledGraph, thread: &str) -> Vec<waypoint_core::StateSnapshot> {
    app.get_state_history(&CheckpointConfig::for_thread(thread), None, None, None)
        .await
        .unwrap()
        .map(|s| s.unwrap())
        .collect()
        .await
}

#[tokio::test]
async fn test_interrupt_before_and_continue() {
    let app = compile(pipeline(), CompileOptions::new().with_interrupt_before(["apply"]));
    let config = RunConfig::for_thread("t-before");

    let paused = app.invoke(json!({}), &config).await.unwrap();
    assert!(paused.is_paused());
    assert!(!paused.is_interrupted());
    assert_eq!(paused.next, vec!["apply"]);
    assert_eq!(paused.values["log"], json!(["plan"]));

    let done = app.invoke(Value::Null, &config).await.unwrap();
    assert!(done.is_complete());
    assert_eq!(done.values["log"], json!(["plan", "apply"]));
}

#[tokio::test]
async fn test_interrupt_after_and_continue_with_command() {
    let app = compile(pipeline(), CompileOptions::new().with_interrupt_after(["plan"]));
    let config = RunConfig::for_thread("t-after");

    let paused = app.invoke(json!({}), &config).await.unwrap();
    assert_eq!(paused.next, vec!["apply"]);
    assert_eq!(paused.values["log"], json!(["plan"]));

    // A resume value at a breakpoint has nothing to answer and is ignored
    let done = app.invoke(Command::resume(json!("ignored")), &config).await.unwrap();
    assert!(done.is_complete());
    assert_eq!(done.values["log"], json!(["plan", "apply"]));
}

#[tokio::test]
async fn test_update_state_at_breakpoint() {
    let app = compile(pipeline(), CompileOptions::new().with_interrupt_before(["apply"]));
    let config = RunConfig::for_thread("t-edit");
    app.invoke(json!({}), &config).await.unwrap();

    let thread = CheckpointConfig::for_thread("t-edit");
    app.update_state(&thread, json!({"log": ["reviewed"]}), None)
        .await
        .unwrap();

    let snapshot = app.get_state(&thread).await.unwrap().unwrap();
    assert_eq!(snapshot.values["log"], json!(["plan", "reviewed"]));
    assert_eq!(snapshot.next, vec!["apply"]);
    assert_eq!(snapshot.metadata.source, Some(CheckpointSource::Update));

    let done = app.invoke(Value::Null, &config).await.unwrap();
    assert_eq!(done.values["log"], json!(["plan", "reviewed", "apply"]));
}

#[tokio::test]
async fn test_update_state_as_node_advances_thread() {
    let app = compile(pipeline(), CompileOptions::new().with_interrupt_before(["apply"]));
    let config = RunConfig::for_thread("t-as-node");
    app.invoke(json!({}), &config).await.unwrap();

    let thread = CheckpointConfig::for_thread("t-as-node");
    app.update_state(&thread, json!({"log": ["manual apply"]}), Some("apply"))
        .await
        .unwrap();

    let snapshot = app.get_state(&thread).await.unwrap().unwrap();
    assert!(snapshot.next.is_empty());
    assert_eq!(snapshot.values["log"], json!(["plan", "manual apply"]));
    assert_eq!(snapshot.metadata.writes, Some(json!({"apply": {"log": ["manual apply"]}})));

    let err = app
        .update_state(&thread, json!({}), Some("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Validation(_)));
}

#[tokio::test]
async fn test_update_state_keeps_pending_resume() {
    let mut graph = StateGraph::new();
    graph
        .add_node("ask", |state| {
            Box::pin(async move {
                let first = interrupt(json!("first?"))?;
                let second = interrupt(json!({"second?": state["note"]}))?;
                Ok(json!({"answers": [first, second]}))
            })
        })
        .set_entry_point("ask")
        .set_finish_point("ask");
    let app = compile(graph, CompileOptions::new());
    let config = RunConfig::for_thread("t-carry");
    let thread = CheckpointConfig::for_thread("t-carry");

    app.invoke(json!({}), &config).await.unwrap();
    app.invoke(Command::resume(json!(1)), &config).await.unwrap();

    // Editing between resumes keeps the recorded answer
    app.update_state(&thread, json!({"note": "edited"}), None)
        .await
        .unwrap();
    let snapshot = app.get_state(&thread).await.unwrap().unwrap();
    assert_eq!(snapshot.interrupts.len(), 1);

    let done = app.invoke(Command::resume(json!(2)), &config).await.unwrap();
    assert_eq!(done.values["answers"], json!([1, 2]));
    assert_eq!(done.values["note"], "edited");
}

#[tokio::test]
async fn test_history_is_newest_first_and_filterable() {
    let app = compile(pipeline(), CompileOptions::new());
    app.invoke(json!({}), &RunConfig::for_thread("t-history"))
        .await
        .unwrap();
    app.update_state(&CheckpointConfig::for_thread("t-history"), json!({"tag": "v1"}), None)
        .await
        .unwrap();

    let all = history(&app, "t-history").await;
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].metadata.source, Some(CheckpointSource::Update));
    assert_eq!(all[3].metadata.source, Some(CheckpointSource::Input));
    for pair in all.windows(2) {
        assert_eq!(
            pair[0].parent_config.as_ref().and_then(|c| c.checkpoint_id.clone()),
            pair[1].config.checkpoint_id
        );
    }

    let mut filter = HashMap::new();
    filter.insert("source".to_string(), json!("loop"));
    let loops: Vec<_> = app
        .get_state_history(&CheckpointConfig::for_thread("t-history"), Some(filter), None, None)
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(loops.len(), 2);

    let limited: Vec<_> = app
        .get_state_history(
            &CheckpointConfig::for_thread("t-history"),
            None,
            Some(&all[1].config),
            Some(1),
        )
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(limited.len(), 1);
    assert_eq!(
        limited[0].as_ref().unwrap().config.checkpoint_id,
        all[2].config.checkpoint_id
    );
}

#[tokio::test]
async fn test_replay_from_earlier_checkpoint() {
    let app = compile(pipeline(), CompileOptions::new());
    app.invoke(json!({}), &RunConfig::for_thread("t-fork"))
        .await
        .unwrap();

    let all = history(&app, "t-fork").await;
    let after_plan = all
        .iter()
        .find(|s| s.metadata.step == Some(0))
        .unwrap()
        .config
        .clone();

    let replayed = app
        .invoke(Value::Null, &RunConfig::from(&after_plan))
        .await
        .unwrap();
    assert_eq!(replayed.values["log"], json!(["plan", "apply"]));

    let latest = app
        .get_state(&CheckpointConfig::for_thread("t-fork"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        latest.parent_config.and_then(|c| c.checkpoint_id),
        after_plan.checkpoint_id
    );
}

#[tokio::test]
async fn test_editing_old_checkpoint_forks() {
    let app = compile(pipeline(), CompileOptions::new());
    app.invoke(json!({}), &RunConfig::for_thread("t-branch"))
        .await
        .unwrap();

    let all = history(&app, "t-branch").await;
    let after_plan = all
        .iter()
        .find(|s| s.metadata.step == Some(0))
        .unwrap()
        .config
        .clone();

    let forked = app
        .update_state(&after_plan, json!({"log": ["edit"]}), None)
        .await
        .unwrap();
    let snapshot = app.get_state(&forked).await.unwrap().unwrap();
    assert_eq!(snapshot.metadata.source, Some(CheckpointSource::Fork));
    assert_eq!(snapshot.values["log"], json!(["plan", "edit"]));
    assert_eq!(snapshot.next, vec!["apply"]);

    let latest = CheckpointConfig::for_thread("t-branch");
    let edited = app.update_state(&latest, json!({"log": ["note"]}), None).await.unwrap();
    let snapshot = app.get_state(&edited).await.unwrap().unwrap();
    assert_eq!(snapshot.metadata.source, Some(CheckpointSource::Update));
}

#[tokio::test]
async fn test_stream_events_in_order() {
    let app = compile(pipeline(), CompileOptions::new());
    let events: Vec<StreamEvent> = app
        .stream(json!({}), &RunConfig::for_thread("t-stream"))
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    let kinds: Vec<String> = events
        .iter()
        .map(|e| match e {
            StreamEvent::TaskStart { node, .. } => format!("start:{node}"),
            StreamEvent::Message { node, .. } => format!("message:{node}"),
            StreamEvent::Updates { node, .. } => format!("update:{node}"),
            StreamEvent::Values { step, .. } => format!("values:{step}"),
            StreamEvent::Interrupt { .. } => "interrupt".to_string(),
            StreamEvent::End { .. } => "end".to_string(),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "start:plan",
            "update:plan",
            "values:0",
            "start:apply",
            "update:apply",
            "values:1",
            "end"
        ]
    );

    match events.last() {
        Some(StreamEvent::End { outcome }) => {
            assert_eq!(outcome.values["log"], json!(["plan", "apply"]))
        }
        other => panic!("unexpected last event: {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_reports_interrupt_and_errors() {
    let mut graph = StateGraph::new();
    graph
        .add_node("ask", |_| {
            Box::pin(async move {
                let answer = interrupt(json!("stream?"))?;
                Ok(json!({"answer": answer}))
            })
        })
        .set_entry_point("ask")
        .set_finish_point("ask");
    let app = compile(graph, CompileOptions::new());

    let events: Vec<_> = app
        .stream(json!({}), &RunConfig::for_thread("t-stream-int"))
        .await
        .unwrap()
        .collect()
        .await;
    assert!(matches!(events[events.len() - 2], Ok(StreamEvent::Interrupt { .. })));
    assert!(matches!(events[events.len() - 1], Ok(StreamEvent::End { .. })));

    // Missing thread id surfaces as the stream's only item
    let events: Vec<_> = app.stream(json!({}), &RunConfig::new()).await.unwrap().collect().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Err(GraphError::Configuration(_))));
}

#[tokio::test]
async fn test_stream_message_chunks_across_resume() {
    let mut graph = StateGraph::new();
    graph
        .add_node("draft", |_| {
            Box::pin(async move {
                emit_message(json!({"content": "Drafting"})).await;
                let answer = interrupt(json!("publish?"))?;
                emit_message(json!({"content": "Publishing"})).await;
                Ok(json!({"published": answer}))
            })
        })
        .set_entry_point("draft")
        .set_finish_point("draft");
    let app = compile(graph, CompileOptions::new());
    let config = RunConfig::for_thread("t-chunks");

    let chunks = |events: Vec<StreamEvent>| -> Vec<(String, Value)> {
        events
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::Message { node, chunk, .. } => Some((node, chunk["content"].clone())),
                _ => None,
            })
            .collect()
    };

    let first: Vec<StreamEvent> = app
        .stream(json!({}), &config)
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    assert_eq!(chunks(first), vec![("draft".to_string(), json!("Drafting"))]);

    let resumed: Vec<StreamEvent> = app
        .stream(Command::resume(json!("yes")), &config)
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    assert!(matches!(resumed.first(), Some(StreamEvent::TaskStart { .. })));
    assert_eq!(
        chunks(resumed),
        vec![
            ("draft".to_string(), json!("Drafting")),
            ("draft".to_string(), json!("Publishing")),
        ]
    );

    // invoke drops chunks
    let outcome = app
        .invoke(json!({}), &RunConfig::for_thread("t-chunks-invoke"))
        .await
        .unwrap();
    assert!(outcome.is_interrupted());
}
