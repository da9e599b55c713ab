//! # waypoint-core - Suspendable, checkpointed graph execution
//!
//! Build workflows as graphs of async nodes over a shared JSON state, run
//! them step by step, and pause them in the middle of a node to wait for a
//! human (or any outside system). Every step is checkpointed per **thread**,
//! so a paused workflow can be resumed minutes or days later, from another
//! process, with the answer the node was waiting for.
//!
//! ## Core concepts
//!
//! - **[`StateGraph`]** collects nodes, edges, conditional edges and field
//!   reducers, then compiles into a [`CompiledGraph`].
//! - **Steps**: the nodes active in a step run concurrently; their updates
//!   are merged in activation order through the [`StateSchema`]; the next
//!   step's nodes come from `goto` commands, static edges and routers.
//! - **Checkpoints**: after each step the state, the next nodes and any
//!   pending interrupts are saved through a
//!   [`CheckpointSaver`](waypoint_checkpoint::CheckpointSaver).
//! - **Suspension**: a node calls [`interrupt()`] with a payload. The step is
//!   saved and the invocation returns a [`RunOutcome`] listing the pending
//!   interrupts. Resuming with [`Command::resume`] re-runs the node; the same
//!   `interrupt` call now returns the resume value.
//! - **Static breakpoints**: [`InterruptConfig`] pauses before or after named
//!   nodes.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use waypoint_core::{
//!     interrupt, Command, CompileOptions, InMemoryCheckpointSaver, RunConfig, StateGraph, END,
//! };
//!
//! #[tokio::main]
//! async fn main() -> waypoint_core::Result<()> {
//!     let mut graph = StateGraph::new();
//!     graph.add_node("draft", |_| Box::pin(async move {
//!         Ok(json!({"text": "rollout plan v1"}))
//!     }));
//!     graph.add_node("approve", |state| Box::pin(async move {
//!         let answer = interrupt(json!({"approve": state["text"]}))?;
//!         Ok(json!({"approved": answer == json!("yes")}))
//!     }));
//!     graph.set_entry_point("draft");
//!     graph.add_edge("draft", "approve");
//!     graph.add_edge("approve", END);
//!
//!     let saver = Arc::new(InMemoryCheckpointSaver::new());
//!     let app = graph.compile_with(CompileOptions::new().with_checkpointer(saver))?;
//!     let config = RunConfig::for_thread("change-1138");
//!
//!     let paused = app.invoke(json!({}), &config).await?;
//!     assert!(paused.is_interrupted());
//!
//!     let done = app.invoke(Command::resume(json!("yes")), &config).await?;
//!     assert_eq!(done.values["approved"], json!(true));
//!     Ok(())
//! }
//! ```
//!
//! ## Module organization
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`builder`] | [`StateGraph`], [`CompileOptions`] |
//! | [`graph`] | graph structure, [`START`] / [`END`] |
//! | [`compiled`] | [`CompiledGraph`]: invoke, stream, state inspection |
//! | [`command`] | [`Command`] resume / update / goto directives |
//! | [`interrupt`](mod@interrupt) | [`interrupt()`], [`InterruptConfig`] |
//! | [`state`] | [`StateSchema`] and reducers |
//! | [`runtime`] | per-node context |
//! | [`config`] | [`WaypointConfig`] file / environment configuration |
//! | [`telemetry`] | tracing subscriber setup |

pub mod builder;
pub mod command;
pub mod compiled;
pub mod config;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod node_result;
pub mod runtime;
pub mod state;
pub mod telemetry;

pub use builder::{CompileOptions, StateGraph, DEFAULT_RECURSION_LIMIT};
pub use command::{Command, GotoTarget, ResumeValue};
pub use compiled::{
    CompiledGraph, EventStream, GraphInput, RunConfig, RunOutcome, StateSnapshot,
    StateSnapshotStream, StreamEvent,
};
pub use config::{CheckpointBackendConfig, LogFormat, LoggingConfig, WaypointConfig};
pub use error::{GraphError, Result};
pub use graph::{NodeId, Route, END, START};
pub use interrupt::{interrupt, InterruptConfig};
pub use node_result::NodeOutput;
pub use runtime::{emit_message, NodeContext};
pub use state::{Reducer, StateError, StateSchema};

pub use waypoint_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointMetadata, CheckpointSaver,
    CheckpointSource, CheckpointTuple, InMemoryCheckpointSaver, PendingInterrupt,
};
#[cfg(feature = "sqlite")]
pub use waypoint_checkpoint::SqliteCheckpointSaver;
