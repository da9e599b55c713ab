//! Tests for CompiledGraph
//!
//! Engine behavior without a checkpointer plus the basic checkpointed paths.
//! Multi-invocation suspension scenarios live in `tests/`.

#[cfg(test)]
mod tests {
    use crate::error::GraphError;
    use crate::state::{AppendReducer, SumReducer};
    use crate::{interrupt, Command, CompileOptions, RunConfig, StateGraph, END};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use waypoint_checkpoint::{CheckpointConfig, CheckpointError, InMemoryCheckpointSaver};

    fn linear() -> StateGraph {
        let mut graph = StateGraph::new();
        graph.add_field("log", AppendReducer);
        graph
            .add_node("a", |_| Box::pin(async move { Ok(json!({"log": ["a"]})) }))
            .add_node("b", |_| Box::pin(async move { Ok(json!({"log": ["b"]})) }))
            .set_entry_point("a")
            .add_edge("a", "b")
            .set_finish_point("b");
        graph
    }

    #[tokio::test]
    async fn test_basic_invoke() {
        let compiled = linear().compile().unwrap();
        let outcome = compiled.invoke(json!({"log": []}), &RunConfig::new()).await.unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.values["log"], json!(["a", "b"]));
        assert!(outcome.config.is_none());
    }

    #[tokio::test]
    async fn test_node_sees_updated_state() {
        let mut graph = StateGraph::new();
        graph.add_field("n", SumReducer);
        graph
            .add_node("inc", |_| Box::pin(async move { Ok(json!({"n": 1})) }))
            .add_node("double", |state| {
                Box::pin(async move {
                    let n = state["n"].as_i64().unwrap_or(0);
                    Ok(json!({"n": n}))
                })
            })
            .set_entry_point("inc")
            .add_edge("inc", "double")
            .set_finish_point("double");

        let outcome = graph
            .compile()
            .unwrap()
            .invoke(json!({"n": 2}), &RunConfig::new())
            .await
            .unwrap();
        assert_eq!(outcome.values["n"], json!(6));
    }

    #[tokio::test]
    async fn test_fan_out_updates_applied_in_activation_order() {
        let mut graph = StateGraph::new();
        graph.add_field("log", AppendReducer);
        graph
            .add_node("start", |_| Box::pin(async move { Ok(json!({})) }))
            .add_node("slow", |_| {
                Box::pin(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok(json!({"log": ["slow"]}))
                })
            })
            .add_node("fast", |_| Box::pin(async move { Ok(json!({"log": ["fast"]})) }))
            .set_entry_point("start")
            .add_edge("start", "slow")
            .add_edge("start", "fast")
            .set_finish_point("slow")
            .set_finish_point("fast");

        let outcome = graph
            .compile()
            .unwrap()
            .invoke(json!({}), &RunConfig::new())
            .await
            .unwrap();
        assert_eq!(outcome.values["log"], json!(["slow", "fast"]));
    }

    #[tokio::test]
    async fn test_conditional_loop_and_recursion_limit() {
        let mut graph = StateGraph::new();
        graph.add_field("n", SumReducer);
        graph
            .add_node("tick", |_| Box::pin(async move { Ok(json!({"n": 1})) }))
            .set_entry_point("tick")
            .add_conditional_edges(
                "tick",
                |state: &Value| if state["n"].as_i64().unwrap_or(0) < 3 { "tick" } else { END },
                None,
            );
        let compiled = graph.compile().unwrap();

        let outcome = compiled.invoke(json!({"n": 0}), &RunConfig::new()).await.unwrap();
        assert_eq!(outcome.values["n"], json!(3));

        let err = compiled
            .invoke(json!({"n": 0}), &RunConfig::new().with_recursion_limit(2))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::RecursionLimit { limit: 2 }));
    }

    #[tokio::test]
    async fn test_command_goto_overrides_edges() {
        let mut graph = StateGraph::new();
        graph.add_field("log", AppendReducer);
        graph
            .add_command_node("router", |_| {
                Box::pin(async move {
                    Ok(Command::goto("special").with_update(json!({"log": ["router"]})))
                })
            })
            .add_node("special", |_| Box::pin(async move { Ok(json!({"log": ["special"]})) }))
            .set_entry_point("router")
            .set_finish_point("router")
            .set_finish_point("special");

        let outcome = graph
            .compile()
            .unwrap()
            .invoke(json!({}), &RunConfig::new())
            .await
            .unwrap();
        assert_eq!(outcome.values["log"], json!(["router", "special"]));
    }

    #[tokio::test]
    async fn test_goto_unknown_node_fails() {
        let mut graph = StateGraph::new();
        graph
            .add_command_node("a", |_| Box::pin(async move { Ok(Command::goto("ghost")) }))
            .set_entry_point("a")
            .set_finish_point("a");

        let err = graph
            .compile()
            .unwrap()
            .invoke(json!({}), &RunConfig::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_node_error_is_wrapped() {
        let mut graph = StateGraph::new();
        graph
            .add_node("boom", |_| {
                Box::pin(async move { Err(GraphError::Execution("disk full".to_string())) })
            })
            .set_entry_point("boom")
            .set_finish_point("boom");

        let err = graph
            .compile()
            .unwrap()
            .invoke(json!({}), &RunConfig::new())
            .await
            .unwrap_err();
        match err {
            GraphError::NodeExecution { node, error } => {
                assert_eq!(node, "boom");
                assert!(error.contains("disk full"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_interrupt_without_checkpointer_cannot_resume() {
        let mut graph = StateGraph::new();
        graph
            .add_node("ask", |_| {
                Box::pin(async move {
                    let answer = interrupt(json!("approve?"))?;
                    Ok(json!({"answer": answer}))
                })
            })
            .set_entry_point("ask")
            .set_finish_point("ask");
        let compiled = graph.compile().unwrap();

        let outcome = compiled.invoke(json!({}), &RunConfig::new()).await.unwrap();
        assert!(outcome.is_interrupted());
        assert_eq!(outcome.next, vec!["ask"]);
        assert_eq!(outcome.interrupts[0].value, json!("approve?"));

        let err = compiled
            .invoke(Command::resume(json!("yes")), &RunConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_checkpointer_requires_thread_id() {
        let compiled = linear()
            .compile_with(CompileOptions::new().with_checkpointer(Arc::new(InMemoryCheckpointSaver::new())))
            .unwrap();
        let err = compiled.invoke(json!({}), &RunConfig::new()).await.unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_checkpoint_id() {
        let compiled = linear()
            .compile_with(CompileOptions::new().with_checkpointer(Arc::new(InMemoryCheckpointSaver::new())))
            .unwrap();
        let config = RunConfig::for_thread("t").with_checkpoint_id("nope");
        let err = compiled.invoke(json!({}), &config).await.unwrap_err();
        assert!(matches!(err, GraphError::Checkpoint(CheckpointError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_checkpoints_per_step() {
        let saver = Arc::new(InMemoryCheckpointSaver::new());
        let compiled = linear()
            .compile_with(CompileOptions::new().with_checkpointer(saver))
            .unwrap();
        let config = RunConfig::for_thread("t-steps");

        let outcome = compiled.invoke(json!({"log": []}), &config).await.unwrap();
        assert!(outcome.config.is_some());

        let snapshot = compiled
            .get_state(&CheckpointConfig::for_thread("t-steps"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.values["log"], json!(["a", "b"]));
        assert!(snapshot.next.is_empty());
        assert_eq!(snapshot.metadata.step, Some(1));

        // input + two steps
        use futures::StreamExt;
        let history: Vec<_> = compiled
            .get_state_history(&CheckpointConfig::for_thread("t-steps"), None, None, None)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(history.len(), 3);
        let steps: Vec<_> = history
            .into_iter()
            .map(|s| s.unwrap().metadata.step)
            .collect();
        assert_eq!(steps, vec![Some(1), Some(0), Some(-1)]);
    }

    #[tokio::test]
    async fn test_second_input_continues_thread_state() {
        let saver = Arc::new(InMemoryCheckpointSaver::new());
        let compiled = linear()
            .compile_with(CompileOptions::new().with_checkpointer(saver))
            .unwrap();
        let config = RunConfig::for_thread("t-again");

        compiled.invoke(json!({"log": []}), &config).await.unwrap();
        let outcome = compiled.invoke(json!({"log": ["again"]}), &config).await.unwrap();
        assert_eq!(outcome.values["log"], json!(["a", "b", "again", "a", "b"]));
    }

    #[tokio::test]
    async fn test_get_state_without_checkpointer() {
        let compiled = linear().compile().unwrap();
        let state = compiled
            .get_state(&CheckpointConfig::for_thread("t"))
            .await
            .unwrap();
        assert!(state.is_none());

        let err = compiled
            .update_state(&CheckpointConfig::for_thread("t"), json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }
}
