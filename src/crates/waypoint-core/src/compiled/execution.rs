//! The execution loop
//!
//! One invocation runs in **steps**. Each step:
//!
//! 1. runs the active nodes concurrently (each inside its own node context)
//! 2. if any node suspended: saves a checkpoint with `next` = the step's
//!    nodes and the interrupts, stores completed siblings' outputs as
//!    pending writes, and returns
//! 3. otherwise applies the updates in activation order through the schema
//! 4. computes the next set: goto targets, then static edges, then
//!    conditional edges evaluated on the updated state (deduplicated, `END`
//!    dropped)
//! 5. saves a checkpoint and emits stream events
//!
//! Checkpoint metadata `step` is the last **completed** step: `-1` for the
//! input checkpoint, `n` after step `n`. A suspended step keeps the step of
//! its parent, so re-running it on resume uses the same step number and the
//! same interrupt ids.

use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use waypoint_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointMetadata, CheckpointSaver,
    CheckpointSource, CheckpointTuple, PendingInterrupt,
};

use super::types::{GraphInput, RunConfig, RunOutcome, StreamEvent};
use super::CompiledGraph;
use crate::command::{Command, ResumeValue};
use crate::error::{GraphError, Result};
use crate::graph::{NodeId, END};
use crate::runtime::{self, NodeContext};

/// Pending-write channel holding `{id, value}` resume answers, task id = node
pub(crate) const RESUME_CHANNEL: &str = "__resume__";

/// Pending-write channel holding a completed node's output as a `Command`
pub(crate) const TASK_CHANNEL: &str = "__task__";

pub(crate) type EventSender = mpsc::Sender<Result<StreamEvent>>;

impl CompiledGraph {
    /// Run the graph until it finishes, suspends or hits a breakpoint
    ///
    /// `input` is either state values or a [`Command`]:
    ///
    /// - values on a fresh or finished thread are merged into the thread's
    ///   state and the run starts at the entry point
    /// - values on a paused thread discard its pending work and restart at
    ///   the entry point; `Value::Null` instead continues the paused run
    /// - a command resumes, edits and/or redirects the thread
    ///
    /// A suspension is not an error: it returns a [`RunOutcome`] whose
    /// `interrupts` are non-empty.
    ///
    /// ```rust,no_run
    /// use waypoint_core::{Command, RunConfig};
    /// use serde_json::json;
    ///
    /// # async fn example(graph: waypoint_core::CompiledGraph) -> waypoint_core::Result<()> {
    /// let config = RunConfig::for_thread("ticket-42");
    ///
    /// let outcome = graph.invoke(json!({"request": "deploy"}), &config).await?;
    /// if outcome.is_interrupted() {
    ///     println!("needs approval: {}", outcome.interrupts[0].value);
    ///     let outcome = graph.invoke(Command::resume(json!("yes")), &config).await?;
    ///     assert!(outcome.is_complete());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(self, input, config), fields(thread_id = ?config.thread_id))]
    pub async fn invoke(
        &self,
        input: impl Into<GraphInput>,
        config: &RunConfig,
    ) -> Result<RunOutcome> {
        self.run(input.into(), config, None).await.map_err(|e| {
            error!(error = %e, "Graph execution failed");
            e
        })
    }

    pub(crate) async fn run(
        &self,
        input: GraphInput,
        config: &RunConfig,
        events: Option<EventSender>,
    ) -> Result<RunOutcome> {
        let limit = config.recursion_limit.unwrap_or(self.recursion_limit);
        let run = RunLoop::start(self, input, config, events).await?;
        run.execute(limit).await
    }
}

/// Mutable state of one invocation
struct RunLoop<'g> {
    graph: &'g CompiledGraph,
    saver: Option<Arc<dyn CheckpointSaver>>,
    thread_id: String,

    /// Latest saved checkpoint; parent of the next one
    config: Option<CheckpointConfig>,
    has_checkpoint: bool,

    values: Value,
    /// Last completed step
    step: i64,
    tasks: Vec<NodeId>,
    pending_interrupts: Vec<PendingInterrupt>,

    /// Recorded `{id, value}` resume writes per node, one per interrupt id
    resume: HashMap<NodeId, Vec<Value>>,
    /// Outputs of nodes that finished in the current (interrupted) step
    completed: HashMap<NodeId, Command>,

    skip_breakpoint: bool,
    events: Option<EventSender>,
}

impl<'g> RunLoop<'g> {
    async fn start(
        graph: &'g CompiledGraph,
        input: GraphInput,
        config: &RunConfig,
        events: Option<EventSender>,
    ) -> Result<RunLoop<'g>> {
        let saver = graph.checkpoint_saver.clone();
        let thread_id = match (&saver, &config.thread_id) {
            (Some(_), None) => {
                return Err(GraphError::Configuration(
                    "thread_id is required when a checkpointer is configured".to_string(),
                ))
            }
            (_, thread_id) => thread_id.clone().unwrap_or_default(),
        };

        let saved = match &saver {
            Some(saver) => saver.get_tuple(&config.checkpoint_config()).await?,
            None => None,
        };
        if let (None, Some(checkpoint_id)) = (&saved, &config.checkpoint_id) {
            return Err(GraphError::Checkpoint(CheckpointError::NotFound(
                checkpoint_id.clone(),
            )));
        }

        let mut run = RunLoop {
            graph,
            saver,
            thread_id,
            config: None,
            has_checkpoint: false,
            values: Value::Object(Map::new()),
            step: -1,
            tasks: Vec::new(),
            pending_interrupts: Vec::new(),
            resume: HashMap::new(),
            completed: HashMap::new(),
            skip_breakpoint: false,
            events,
        };
        if let Some(tuple) = saved {
            run.restore(tuple)?;
        }

        match input {
            GraphInput::Values(values) => run.start_with_values(values).await?,
            GraphInput::Command(cmd) => run.apply_command(cmd).await?,
        }
        Ok(run)
    }

    fn restore(&mut self, tuple: CheckpointTuple) -> Result<()> {
        for (task, _, write) in tuple.writes_for(RESUME_CHANNEL) {
            self.remember_resume(task.clone(), write.clone());
        }
        for (task, _, write) in tuple.writes_for(TASK_CHANNEL) {
            let cmd: Command = serde_json::from_value(write.clone())?;
            self.completed.insert(task.clone(), cmd);
        }

        self.step = tuple.metadata.step.unwrap_or(-1);
        self.values = tuple.checkpoint.values;
        self.tasks = tuple.checkpoint.next;
        self.pending_interrupts = tuple.checkpoint.interrupts;
        self.config = Some(tuple.config);
        self.has_checkpoint = true;

        debug!(
            thread_id = %self.thread_id,
            step = self.step,
            next = ?self.tasks,
            interrupts = self.pending_interrupts.len(),
            "Restored checkpoint"
        );
        Ok(())
    }

    async fn start_with_values(&mut self, input: Value) -> Result<()> {
        if input.is_null() && !self.tasks.is_empty() {
            info!(thread_id = %self.thread_id, next = ?self.tasks, "Continuing paused thread");
            self.skip_breakpoint = true;
            return Ok(());
        }

        if !self.pending_interrupts.is_empty() {
            warn!(
                thread_id = %self.thread_id,
                discarded = self.pending_interrupts.len(),
                "New input discards pending interrupts"
            );
        } else if !self.tasks.is_empty() {
            warn!(thread_id = %self.thread_id, next = ?self.tasks, "New input discards paused run");
        }
        self.reset_pending();

        self.graph.schema.apply(&mut self.values, &input)?;
        self.tasks = vec![self.entry()?];
        self.step = if self.has_checkpoint { self.step + 1 } else { -1 };
        self.save(
            CheckpointSource::Input,
            Some(json!({ "__input__": input })),
            Vec::new(),
        )
        .await
    }

    async fn apply_command(&mut self, cmd: Command) -> Result<()> {
        if let Some(resume) = cmd.resume.clone() {
            if self.saver.is_none() {
                return Err(GraphError::Configuration(
                    "Resuming requires a checkpointer".to_string(),
                ));
            }
            if !self.has_checkpoint {
                return Err(GraphError::InvalidResume(format!(
                    "No checkpoint found for thread '{}'",
                    self.thread_id
                )));
            }
            self.record_resume(resume).await?;
        }

        if let Some(update) = &cmd.update {
            self.graph.schema.apply(&mut self.values, update)?;
        }

        if let Some(goto) = &cmd.goto {
            let targets = self.checked_targets(goto.nodes())?;
            if !self.pending_interrupts.is_empty() || !self.tasks.is_empty() {
                info!(
                    thread_id = %self.thread_id,
                    abandoned = ?self.tasks,
                    goto = ?targets,
                    "Redirecting paused thread"
                );
            }
            self.reset_pending();
            self.tasks = targets;
        }

        if !self.has_checkpoint {
            if cmd.goto.is_none() {
                self.tasks = vec![self.entry()?];
            }
            self.step = -1;
            let writes = json!({ "__input__": cmd.update.clone().unwrap_or(Value::Null) });
            return self.save(CheckpointSource::Input, Some(writes), Vec::new()).await;
        }

        if self.tasks.is_empty() {
            if let Some(update) = &cmd.update {
                // Finished thread: persist the edit, nothing to run
                let writes = json!({ "__update__": update });
                self.save(CheckpointSource::Update, Some(writes), Vec::new()).await?;
            }
        }
        self.skip_breakpoint = true;
        Ok(())
    }

    /// Match resume values to pending interrupts and persist them
    async fn record_resume(&mut self, resume: ResumeValue) -> Result<()> {
        let answered: Vec<(PendingInterrupt, Value)> = match resume {
            ResumeValue::Single(value) => match self.pending_interrupts.len() {
                0 if self.tasks.is_empty() => {
                    return Err(GraphError::InvalidResume(format!(
                        "Thread '{}' has no pending interrupts",
                        self.thread_id
                    )))
                }
                0 => {
                    debug!(thread_id = %self.thread_id, "Resume value ignored at static breakpoint");
                    Vec::new()
                }
                1 => vec![(self.pending_interrupts[0].clone(), value)],
                n => {
                    return Err(GraphError::InvalidResume(format!(
                        "{} interrupts are pending; resume them by id",
                        n
                    )))
                }
            },
            ResumeValue::ByInterruptId(map) => {
                if self.pending_interrupts.is_empty() {
                    return Err(GraphError::InvalidResume(format!(
                        "Thread '{}' has no pending interrupts",
                        self.thread_id
                    )));
                }
                if let Some(unknown) = map
                    .keys()
                    .find(|id| !self.pending_interrupts.iter().any(|p| &p.id == *id))
                {
                    return Err(GraphError::InvalidResume(format!(
                        "Unknown interrupt id '{}'",
                        unknown
                    )));
                }
                self.pending_interrupts
                    .iter()
                    .filter_map(|p| map.get(&p.id).map(|v| (p.clone(), v.clone())))
                    .collect()
            }
        };

        for (pending, value) in answered {
            let write = json!({ "id": pending.id, "value": value });
            if let (Some(saver), Some(config)) = (&self.saver, &self.config) {
                saver
                    .put_writes(
                        config,
                        vec![(RESUME_CHANNEL.to_string(), write.clone())],
                        pending.node.clone(),
                    )
                    .await?;
            }
            info!(
                thread_id = %self.thread_id,
                node = %pending.node,
                interrupt_id = %pending.id,
                "Recorded resume value"
            );
            self.remember_resume(pending.node, write);
        }
        Ok(())
    }

    /// Keep the latest answer per interrupt id; a retry replaces the earlier one
    fn remember_resume(&mut self, node: NodeId, write: Value) {
        let writes = self.resume.entry(node).or_default();
        writes.retain(|w| w["id"] != write["id"]);
        writes.push(write);
    }

    async fn execute(mut self, limit: usize) -> Result<RunOutcome> {
        let mut steps_run = 0usize;

        loop {
            if self.tasks.is_empty() {
                debug!(thread_id = %self.thread_id, step = self.step, "Run finished");
                return Ok(self.finish().await);
            }

            if !self.skip_breakpoint {
                if let Some(node) = self
                    .tasks
                    .iter()
                    .find(|n| self.graph.interrupt_config.should_interrupt_before(n))
                {
                    info!(thread_id = %self.thread_id, node = %node, "Paused before node");
                    return Ok(self.finish().await);
                }
            }
            self.skip_breakpoint = false;

            if steps_run >= limit {
                return Err(GraphError::RecursionLimit { limit });
            }
            steps_run += 1;

            let step = self.step + 1;
            let interrupts = self.run_step(step).await?;
            if !interrupts.is_empty() {
                self.suspend(interrupts).await?;
                return Ok(self.finish().await);
            }

            let ran = self.apply_step(step).await?;
            if !self.tasks.is_empty()
                && ran
                    .iter()
                    .any(|n| self.graph.interrupt_config.should_interrupt_after(n))
            {
                info!(thread_id = %self.thread_id, after = ?ran, "Paused after node");
                return Ok(self.finish().await);
            }
        }
    }

    /// Run the step's nodes that have no stored output yet
    async fn run_step(&mut self, step: i64) -> Result<Vec<PendingInterrupt>> {
        let to_run: Vec<NodeId> = self
            .tasks
            .iter()
            .filter(|t| !self.completed.contains_key(*t))
            .cloned()
            .collect();

        let mut futures = Vec::with_capacity(to_run.len());
        for name in &to_run {
            let spec = self
                .graph
                .graph
                .node(name)
                .ok_or_else(|| GraphError::Execution(format!("Unknown node '{}'", name)))?;
            let resume: HashMap<String, Value> = self
                .resume
                .get(name)
                .map(|writes| {
                    writes
                        .iter()
                        .filter_map(|w| Some((w["id"].as_str()?.to_string(), w["value"].clone())))
                        .collect()
                })
                .unwrap_or_default();
            let ctx = NodeContext::new(self.thread_id.clone(), step, name.clone(), resume)
                .with_events(self.events.clone());

            self.emit(StreamEvent::TaskStart {
                step,
                node: name.clone(),
            })
            .await;
            debug!(step, node = %name, "Starting node");
            futures.push(runtime::scope(ctx, (spec.func)(self.values.clone())));
        }

        let results = join_all(futures).await;

        let mut interrupts = Vec::new();
        for (name, result) in to_run.iter().zip(results) {
            match result {
                Ok(output) => {
                    debug!(step, node = %name, "Node completed");
                    self.completed.insert(name.clone(), output.into_command());
                }
                Err(GraphError::Interrupt(pending)) => {
                    info!(step, node = %name, interrupt_id = %pending.id, "Node suspended");
                    interrupts.push(pending);
                }
                Err(err) => {
                    error!(step, node = %name, error = %err, "Node failed");
                    return Err(match err {
                        err @ GraphError::NodeExecution { .. } => err,
                        other => GraphError::node_execution(name.clone(), other),
                    });
                }
            }
        }
        Ok(interrupts)
    }

    /// Save the interrupted step so it can be resumed
    async fn suspend(&mut self, interrupts: Vec<PendingInterrupt>) -> Result<()> {
        self.pending_interrupts = interrupts.clone();
        self.save(CheckpointSource::Loop, None, interrupts.clone()).await?;

        if let (Some(saver), Some(config)) = (&self.saver, &self.config) {
            for task in &self.tasks {
                if let Some(cmd) = self.completed.get(task) {
                    let write = serde_json::to_value(cmd)?;
                    saver
                        .put_writes(config, vec![(TASK_CHANNEL.to_string(), write)], task.clone())
                        .await?;
                } else if let Some(writes) = self.resume.get(task) {
                    let writes = writes
                        .iter()
                        .map(|w| (RESUME_CHANNEL.to_string(), w.clone()))
                        .collect();
                    saver.put_writes(config, writes, task.clone()).await?;
                }
            }
        }

        self.emit(StreamEvent::Interrupt { interrupts }).await;
        Ok(())
    }

    /// Apply completed outputs, route, checkpoint. Returns the nodes that ran.
    async fn apply_step(&mut self, step: i64) -> Result<Vec<NodeId>> {
        let tasks = std::mem::take(&mut self.tasks);
        let commands: Vec<(NodeId, Command)> = tasks
            .iter()
            .filter_map(|t| self.completed.remove(t).map(|cmd| (t.clone(), cmd)))
            .collect();

        let mut writes = Map::new();
        for (node, cmd) in &commands {
            let update = cmd.update.clone().unwrap_or(Value::Null);
            self.graph.schema.apply(&mut self.values, &update)?;
            self.emit(StreamEvent::Updates {
                step,
                node: node.clone(),
                update: update.clone(),
            })
            .await;
            writes.insert(node.clone(), update);
        }

        let mut next = Vec::new();
        for (node, cmd) in &commands {
            next.extend(cmd.goto_nodes());
            next.extend(self.graph.graph.successors(node, &self.values)?);
        }

        self.step = step;
        self.tasks = self.checked_targets(next)?;
        self.reset_pending();

        debug!(step, next = ?self.tasks, "Step complete");
        self.save(CheckpointSource::Loop, Some(Value::Object(writes)), Vec::new())
            .await?;
        self.emit(StreamEvent::Values {
            step,
            values: self.values.clone(),
        })
        .await;

        Ok(commands.into_iter().map(|(node, _)| node).collect())
    }

    async fn save(
        &mut self,
        source: CheckpointSource,
        writes: Option<Value>,
        interrupts: Vec<PendingInterrupt>,
    ) -> Result<()> {
        let Some(saver) = self.saver.clone() else {
            return Ok(());
        };

        let parent = self
            .config
            .clone()
            .unwrap_or_else(|| CheckpointConfig::for_thread(self.thread_id.clone()));
        let checkpoint =
            Checkpoint::new(self.values.clone(), self.tasks.clone()).with_interrupts(interrupts);
        let mut metadata = CheckpointMetadata::new()
            .with_source(source)
            .with_step(self.step);
        if let Some(writes) = writes {
            metadata = metadata.with_writes(writes);
        }

        let saved = saver.put(&parent, checkpoint, metadata).await?;
        debug!(
            thread_id = %self.thread_id,
            checkpoint_id = ?saved.checkpoint_id,
            step = self.step,
            "Saved checkpoint"
        );
        self.config = Some(saved);
        self.has_checkpoint = true;
        Ok(())
    }

    fn entry(&self) -> Result<NodeId> {
        self.graph
            .graph
            .entry()
            .map(str::to_string)
            .ok_or_else(|| GraphError::Validation("No entry point set".to_string()))
    }

    /// Deduplicate, drop `END` and check that every target exists
    fn checked_targets(&self, targets: Vec<NodeId>) -> Result<Vec<NodeId>> {
        let next = next_nodes(targets);
        if let Some(unknown) = next.iter().find(|n| !self.graph.graph.contains_node(n)) {
            return Err(GraphError::Execution(format!(
                "Routing target '{}' does not exist",
                unknown
            )));
        }
        Ok(next)
    }

    fn reset_pending(&mut self) {
        self.pending_interrupts.clear();
        self.resume.clear();
        self.completed.clear();
    }

    async fn emit(&self, event: StreamEvent) {
        if let Some(events) = &self.events {
            // Receiver gone means nobody is listening; keep running.
            let _ = events.send(Ok(event)).await;
        }
    }

    async fn finish(self) -> RunOutcome {
        let outcome = RunOutcome {
            values: self.values.clone(),
            next: self.tasks.clone(),
            interrupts: self.pending_interrupts.clone(),
            config: self.config.clone(),
        };
        self.emit(StreamEvent::End {
            outcome: outcome.clone(),
        })
        .await;
        outcome
    }
}

/// Deduplicate node names preserving first occurrence, dropping `END`
pub(crate) fn next_nodes(targets: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|n| n != END && seen.insert(n.clone()))
        .collect()
}
