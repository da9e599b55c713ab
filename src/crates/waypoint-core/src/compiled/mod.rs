//! Executable graphs
//!
//! A [`CompiledGraph`] is produced by [`StateGraph::compile`](crate::StateGraph::compile)
//! and can be invoked any number of times, on any number of threads.
//!
//! # Execution modes
//!
//! - [`invoke`](CompiledGraph::invoke) runs until the graph finishes or
//!   pauses and returns a [`RunOutcome`]
//! - [`stream`](CompiledGraph::stream) runs in the background and yields
//!   [`StreamEvent`]s as steps complete
//!
//! # Suspension and resume
//!
//! A node calls [`interrupt`](crate::interrupt()) to ask for outside input.
//! The step is saved with its pending interrupts and the invocation returns.
//! A later `invoke(Command::resume(..))` on the same thread re-runs the
//! suspended node from its start; the `interrupt` call now returns the
//! resume value. Work done before the call is repeated, so keep side effects
//! after it (or make them idempotent).
//!
//! # Inspection
//!
//! [`get_state`](CompiledGraph::get_state),
//! [`get_state_history`](CompiledGraph::get_state_history) and
//! [`update_state`](CompiledGraph::update_state) read and edit a thread's
//! checkpoints.

pub(crate) mod execution;
mod graph;
mod state;
mod streaming;
mod types;
#[cfg(test)]
mod tests;

pub use graph::CompiledGraph;
pub use types::{
    EventStream, GraphInput, RunConfig, RunOutcome, StateSnapshot, StateSnapshotStream,
    StreamEvent,
};
