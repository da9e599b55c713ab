//! CompiledGraph struct and builder methods

use std::fmt;
use std::sync::Arc;
use waypoint_checkpoint::CheckpointSaver;

use crate::builder::CompileOptions;
use crate::graph::Graph;
use crate::interrupt::InterruptConfig;
use crate::state::StateSchema;

/// Compiled graph ready for execution
///
/// Cheap to clone; the graph definition and schema are shared.
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) graph: Arc<Graph>,
    pub(crate) schema: Arc<StateSchema>,
    pub(crate) checkpoint_saver: Option<Arc<dyn CheckpointSaver>>,
    pub(crate) interrupt_config: InterruptConfig,
    pub(crate) recursion_limit: usize,
}

impl CompiledGraph {
    pub(crate) fn new(graph: Graph, schema: StateSchema, options: CompileOptions) -> Self {
        Self {
            graph: Arc::new(graph),
            schema: Arc::new(schema),
            checkpoint_saver: options.checkpointer,
            interrupt_config: options.interrupts,
            recursion_limit: options.recursion_limit,
        }
    }

    /// Set the checkpoint saver
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpoint_saver = Some(saver);
        self
    }

    /// Set the static breakpoints
    pub fn with_interrupt_config(mut self, config: InterruptConfig) -> Self {
        self.interrupt_config = config;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn interrupt_config(&self) -> &InterruptConfig {
        &self.interrupt_config
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn CheckpointSaver>> {
        self.checkpoint_saver.as_ref()
    }
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("nodes", &self.graph.node_names())
            .field("entry", &self.graph.entry())
            .field("schema", &self.schema)
            .field("has_checkpointer", &self.checkpoint_saver.is_some())
            .field("interrupt_config", &self.interrupt_config)
            .field("recursion_limit", &self.recursion_limit)
            .finish()
    }
}
