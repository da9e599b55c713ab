//! Streaming execution
//!
//! The graph runs in a background task and pushes [`StreamEvent`]s through a
//! bounded channel; the caller consumes them as an async stream.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use super::types::{EventStream, GraphInput, RunConfig, StreamEvent};
use super::CompiledGraph;
use crate::error::Result;

const EVENT_BUFFER: usize = 100;

impl CompiledGraph {
    /// Run the graph and stream its events
    ///
    /// Same semantics as [`invoke`](Self::invoke). The stream always ends
    /// with [`StreamEvent::End`] unless execution fails, in which case the
    /// last item is the error.
    ///
    /// ```rust,no_run
    /// use futures::StreamExt;
    /// use waypoint_core::{RunConfig, StreamEvent};
    /// use serde_json::json;
    ///
    /// # async fn example(graph: waypoint_core::CompiledGraph) -> waypoint_core::Result<()> {
    /// let mut events = graph.stream(json!({"n": 1}), &RunConfig::for_thread("t")).await?;
    /// while let Some(event) = events.next().await {
    ///     if let StreamEvent::Updates { node, update, .. } = event? {
    ///         println!("{node}: {update}");
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn stream(
        &self,
        input: impl Into<GraphInput>,
        config: &RunConfig,
    ) -> Result<EventStream> {
        let (tx, rx) = mpsc::channel::<Result<StreamEvent>>(EVENT_BUFFER);

        let graph = self.clone();
        let input = input.into();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = graph.run(input, &config, Some(tx.clone())).await {
                error!(error = %e, thread_id = ?config.thread_id, "Streamed execution failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
