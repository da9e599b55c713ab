//! Per-node execution context
//!
//! While a node's future runs, the engine scopes a [`NodeContext`] to it
//! through a tokio task-local. [`interrupt`](crate::interrupt::interrupt)
//! reads the context to find the resume values recorded for the node and to
//! derive stable interrupt ids. Nodes running concurrently in the same step
//! each see their own context.
//!
//! When the graph is driven through `stream()`, the context also carries the
//! event channel, so a node can publish partial output with
//! [`emit_message`] while it is still running.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::compiled::execution::EventSender;
use crate::compiled::StreamEvent;

tokio::task_local! {
    static NODE_CONTEXT: Arc<NodeContext>;
}

/// Execution context of the node currently running
#[derive(Debug)]
pub struct NodeContext {
    thread_id: String,
    step: i64,
    node: String,
    /// Resume values by interrupt id
    resume: HashMap<String, Value>,
    calls: AtomicUsize,
    events: Option<EventSender>,
}

impl NodeContext {
    pub(crate) fn new(
        thread_id: impl Into<String>,
        step: i64,
        node: impl Into<String>,
        resume: HashMap<String, Value>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            step,
            node: node.into(),
            resume,
            calls: AtomicUsize::new(0),
            events: None,
        }
    }

    pub(crate) fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    /// Thread the node runs in; empty when the graph has no checkpointer
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Step number the node runs in
    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Number of resume values recorded for this node
    pub fn resume_count(&self) -> usize {
        self.resume.len()
    }

    /// Claim the next suspension call index
    pub(crate) fn next_call(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst)
    }

    /// Recorded answer for the interrupt `id`
    pub(crate) fn resume_value(&self, id: &str) -> Option<&Value> {
        self.resume.get(id)
    }

    /// Whether a stream consumer is listening
    pub fn is_streaming(&self) -> bool {
        self.events.is_some()
    }
}

/// Publish a chunk of partial output from the running node
///
/// Delivered as [`StreamEvent::Message`] to `stream()` consumers. Outside a
/// node, or when the graph is run with `invoke`, the chunk is dropped.
pub async fn emit_message(chunk: Value) {
    let target = with_node_context(|ctx| {
        ctx.events
            .clone()
            .map(|events| (events, ctx.step, ctx.node.clone()))
    })
    .flatten();

    if let Some((events, step, node)) = target {
        // Receiver gone means nobody is listening.
        let _ = events
            .send(Ok(StreamEvent::Message { step, node, chunk }))
            .await;
    }
}

/// Run `fut` with `ctx` as its node context
pub(crate) async fn scope<F: Future>(ctx: NodeContext, fut: F) -> F::Output {
    NODE_CONTEXT.scope(Arc::new(ctx), fut).await
}

/// Access the current node context, `None` outside a node
pub fn with_node_context<R>(f: impl FnOnce(&NodeContext) -> R) -> Option<R> {
    NODE_CONTEXT.try_with(|ctx| f(ctx)).ok()
}

/// Name of the node currently running, if any
pub fn current_node() -> Option<String> {
    with_node_context(|ctx| ctx.node().to_string())
}
