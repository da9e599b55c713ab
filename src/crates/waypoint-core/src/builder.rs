//! Graph builder
//!
//! [`StateGraph`] collects nodes, edges and the state schema, then compiles
//! into an executable [`CompiledGraph`].
//!
//! ```rust,no_run
//! use waypoint_core::{StateGraph, END};
//! use waypoint_core::state::AppendReducer;
//! use serde_json::json;
//!
//! # fn build() -> waypoint_core::Result<waypoint_core::CompiledGraph> {
//! let mut graph = StateGraph::new();
//! graph.add_field("log", AppendReducer);
//!
//! graph.add_node("draft", |_state| Box::pin(async move {
//!     Ok(json!({"log": ["drafted"]}))
//! }));
//! graph.add_node("publish", |_state| Box::pin(async move {
//!     Ok(json!({"log": ["published"]}))
//! }));
//!
//! graph.set_entry_point("draft");
//! graph.add_edge("draft", "publish");
//! graph.add_edge("publish", END);
//!
//! graph.compile()
//! # }
//! ```
//!
//! Builder methods return `&mut Self` for chaining. Structural mistakes that
//! can be detected while adding (duplicate or reserved node names) are kept
//! and reported by [`compile`](StateGraph::compile).

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use waypoint_checkpoint::CheckpointSaver;

use crate::command::Command;
use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Branch, Graph, NodeFn, NodeId, NodeSpec, Route, END, START};
use crate::interrupt::InterruptConfig;
use crate::node_result::NodeOutput;
use crate::state::{Reducer, StateSchema};

/// Default maximum number of steps per invocation
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Options applied when compiling a graph
#[derive(Clone)]
pub struct CompileOptions {
    /// Persistence backend; required for suspension and resume
    pub checkpointer: Option<Arc<dyn CheckpointSaver>>,

    /// Static breakpoints
    pub interrupts: InterruptConfig,

    /// Default step limit for invocations that don't set one
    pub recursion_limit: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            checkpointer: None,
            interrupts: InterruptConfig::default(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpointer = Some(saver);
        self
    }

    pub fn with_interrupt_before<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.interrupts.interrupt_before = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interrupt_after<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.interrupts.interrupt_after = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interrupts(mut self, interrupts: InterruptConfig) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("has_checkpointer", &self.checkpointer.is_some())
            .field("interrupts", &self.interrupts)
            .field("recursion_limit", &self.recursion_limit)
            .finish()
    }
}

/// Builder for stateful graphs
#[derive(Debug, Default)]
pub struct StateGraph {
    graph: Graph,
    schema: StateSchema,
    error: Option<GraphError>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a state schema with field reducers
    pub fn with_schema(schema: StateSchema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Register a reducer for a state field
    pub fn add_field(&mut self, field: impl Into<String>, reducer: impl Reducer + 'static) -> &mut Self {
        self.schema.add_field(field, reducer);
        self
    }

    /// Add a node returning a partial state update
    pub fn add_node<F>(&mut self, id: impl Into<NodeId>, node: F) -> &mut Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    {
        let func: NodeFn = Arc::new(move |state: Value| -> BoxFuture<'static, Result<NodeOutput>> {
            let fut = node(state);
            Box::pin(async move { fut.await.map(NodeOutput::Update) })
        });
        self.push_node(id.into(), func)
    }

    /// Add a node returning a [`Command`] (update + routing)
    pub fn add_command_node<F>(&mut self, id: impl Into<NodeId>, node: F) -> &mut Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<Command>> + Send + Sync + 'static,
    {
        let func: NodeFn = Arc::new(move |state: Value| -> BoxFuture<'static, Result<NodeOutput>> {
            let fut = node(state);
            Box::pin(async move { fut.await.map(NodeOutput::Command) })
        });
        self.push_node(id.into(), func)
    }

    /// Add a node that decides per call whether to route
    pub fn add_node_with_output<F>(&mut self, id: impl Into<NodeId>, node: F) -> &mut Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<NodeOutput>> + Send + Sync + 'static,
    {
        self.push_node(id.into(), Arc::new(node))
    }

    fn push_node(&mut self, name: NodeId, func: NodeFn) -> &mut Self {
        if let Err(e) = self.graph.add_node(NodeSpec { name, func }) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Add a static edge; an edge from [`START`] sets the entry point
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(from.into(), to.into());
        self
    }

    /// Add a conditional edge
    ///
    /// `router` runs on the state after `from`'s update is applied. Its keys
    /// are translated through `path_map` when given, otherwise they must be
    /// node names (or [`END`]).
    pub fn add_conditional_edges<F, R>(
        &mut self,
        from: impl Into<NodeId>,
        router: F,
        path_map: Option<HashMap<String, NodeId>>,
    ) -> &mut Self
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        R: Into<Route>,
    {
        let branch = Branch {
            router: Arc::new(move |state: &Value| -> Route { router(state).into() }),
            path_map,
        };
        self.graph.add_branch(from.into(), branch);
        self
    }

    pub fn set_entry_point(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.add_edge(START, node)
    }

    pub fn set_finish_point(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.add_edge(node, END)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Validate and compile with default options
    pub fn compile(self) -> Result<CompiledGraph> {
        self.compile_with(CompileOptions::default())
    }

    /// Validate and compile with a checkpointer, breakpoints and limits
    pub fn compile_with(self, options: CompileOptions) -> Result<CompiledGraph> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.graph.validate()?;

        let breakpoints = options
            .interrupts
            .interrupt_before
            .iter()
            .chain(options.interrupts.interrupt_after.iter());
        for node in breakpoints {
            if !self.graph.contains_node(node) {
                return Err(GraphError::Validation(format!(
                    "Breakpoint node '{}' does not exist",
                    node
                )));
            }
        }
        if options.recursion_limit == 0 {
            return Err(GraphError::Validation(
                "Recursion limit must be at least 1".to_string(),
            ));
        }

        tracing::debug!(
            nodes = self.graph.node_names().len(),
            checkpointer = options.checkpointer.is_some(),
            "Compiled graph"
        );
        Ok(CompiledGraph::new(self.graph, self.schema, options))
    }
}
