//! State inspection and editing (get_state, get_state_history, update_state)

use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;
use waypoint_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource};

use super::execution::{next_nodes, RESUME_CHANNEL, TASK_CHANNEL};
use super::types::{StateSnapshot, StateSnapshotStream};
use super::CompiledGraph;
use crate::error::{GraphError, Result};

impl CompiledGraph {
    /// Snapshot of a thread at its latest (or the named) checkpoint
    ///
    /// Returns `None` when the thread has no checkpoint or no checkpointer is
    /// configured.
    pub async fn get_state(&self, config: &CheckpointConfig) -> Result<Option<StateSnapshot>> {
        let Some(saver) = &self.checkpoint_saver else {
            return Ok(None);
        };

        let tuple = saver.get_tuple(config).await?;
        Ok(tuple.map(StateSnapshot::from))
    }

    /// Snapshots of a thread, newest first
    ///
    /// # Arguments
    ///
    /// * `config` - thread to list
    /// * `filter` - only checkpoints whose metadata has these values
    ///   (e.g. `{"source": "update"}`)
    /// * `before` - only checkpoints older than this one
    /// * `limit` - maximum number of snapshots
    pub async fn get_state_history(
        &self,
        config: &CheckpointConfig,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<StateSnapshotStream> {
        let Some(saver) = self.checkpoint_saver.clone() else {
            return Ok(Box::pin(futures::stream::empty()));
        };

        let tuples = saver.list(Some(config), filter, before, limit).await?;
        let snapshots = tuples.map(|result| result.map(StateSnapshot::from).map_err(GraphError::from));
        Ok(Box::pin(snapshots))
    }

    /// Edit a thread's state outside of execution
    ///
    /// `values` are merged through the state schema and saved as a new
    /// checkpoint whose parent is the one `config` names. Editing a
    /// checkpoint other than the thread's latest records the new checkpoint
    /// with source `fork`.
    ///
    /// With `as_node`, the edit is treated as that node's output: the next
    /// nodes become its successors and any pending interrupts are dropped.
    /// Without it, the paused position is kept, so a suspended node can
    /// still be resumed after the edit.
    pub async fn update_state(
        &self,
        config: &CheckpointConfig,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<CheckpointConfig> {
        let Some(saver) = &self.checkpoint_saver else {
            return Err(GraphError::Configuration(
                "update_state requires a checkpointer".to_string(),
            ));
        };
        let thread_id = config.require_thread_id()?.to_string();

        let tuple = saver.get_tuple(config).await?.ok_or_else(|| {
            GraphError::InvalidResume(format!("No checkpoint found for thread '{}'", thread_id))
        })?;

        let mut state = tuple.checkpoint.values.clone();
        self.schema.apply(&mut state, &values)?;
        let step = tuple.metadata.step.unwrap_or(-1);

        let (checkpoint, step, carried) = match as_node {
            Some(node) => {
                if !self.graph.contains_node(node) {
                    return Err(GraphError::Validation(format!(
                        "Node '{}' does not exist",
                        node
                    )));
                }
                let next = next_nodes(self.graph.successors(node, &state)?);
                (Checkpoint::new(state, next), step + 1, Vec::new())
            }
            None => {
                let checkpoint = Checkpoint::new(state, tuple.checkpoint.next.clone())
                    .with_interrupts(tuple.checkpoint.interrupts.clone());
                let carried: Vec<_> = tuple
                    .pending_writes
                    .iter()
                    .filter(|(_, channel, _)| channel == RESUME_CHANNEL || channel == TASK_CHANNEL)
                    .cloned()
                    .collect();
                (checkpoint, step, carried)
            }
        };

        // Editing an older checkpoint branches the thread
        let source = match &config.checkpoint_id {
            Some(id) => match saver.get_tuple(&CheckpointConfig::for_thread(thread_id)).await? {
                Some(latest) if &latest.checkpoint.id != id => CheckpointSource::Fork,
                _ => CheckpointSource::Update,
            },
            None => CheckpointSource::Update,
        };

        let metadata = CheckpointMetadata::new()
            .with_source(source)
            .with_step(step)
            .with_writes(json!({ as_node.unwrap_or("__update__"): values }));

        let saved = saver.put(&tuple.config, checkpoint, metadata).await?;
        for (task, channel, value) in carried {
            saver.put_writes(&saved, vec![(channel, value)], task).await?;
        }

        info!(
            thread_id = ?saved.thread_id,
            checkpoint_id = ?saved.checkpoint_id,
            as_node = ?as_node,
            "Updated state"
        );
        Ok(saved)
    }
}
