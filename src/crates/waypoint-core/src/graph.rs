//! Graph structure: nodes, edges and conditional branches
//!
//! [`Graph`] is the validated, immutable description produced by
//! [`StateGraph`](crate::StateGraph) and executed by
//! [`CompiledGraph`](crate::CompiledGraph).
//!
//! ```text
//!   __start__ ──► assistant ──(route)──► review ──► tools
//!                    ▲            │                   │
//!                    │            └──► __end__        │
//!                    └────────────────────────────────┘
//! ```

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::node_result::NodeOutput;

/// Node identifier
pub type NodeId = String;

/// Virtual node marking the graph entry
pub const START: &str = "__start__";

/// Virtual node marking the graph exit
pub const END: &str = "__end__";

/// Async node function: current state in, output out
pub type NodeFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<NodeOutput>> + Send + Sync>;

/// Routing function evaluated on the updated state
pub type RouterFn = Arc<dyn Fn(&Value) -> Route + Send + Sync>;

/// Decision returned by a conditional edge router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// One destination (node name or path-map key)
    One(String),
    /// Several destinations run concurrently
    Many(Vec<String>),
}

impl Route {
    pub fn into_keys(self) -> Vec<String> {
        match self {
            Route::One(key) => vec![key],
            Route::Many(keys) => keys,
        }
    }
}

impl From<&str> for Route {
    fn from(key: &str) -> Self {
        Route::One(key.to_string())
    }
}

impl From<String> for Route {
    fn from(key: String) -> Self {
        Route::One(key)
    }
}

impl From<Vec<String>> for Route {
    fn from(keys: Vec<String>) -> Self {
        Route::Many(keys)
    }
}

impl From<Vec<&str>> for Route {
    fn from(keys: Vec<&str>) -> Self {
        Route::Many(keys.into_iter().map(String::from).collect())
    }
}

/// A registered node
#[derive(Clone)]
pub struct NodeSpec {
    pub name: NodeId,
    pub func: NodeFn,
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec").field("name", &self.name).finish()
    }
}

/// Conditional edge leaving a node
#[derive(Clone)]
pub struct Branch {
    pub router: RouterFn,

    /// Translates router keys into node names; keys pass through when absent
    pub path_map: Option<HashMap<String, NodeId>>,
}

impl Branch {
    /// Evaluate the router and translate its keys
    pub fn resolve(&self, state: &Value) -> Result<Vec<NodeId>> {
        let keys = (self.router)(state).into_keys();
        let Some(path_map) = &self.path_map else {
            return Ok(keys);
        };

        keys.into_iter()
            .map(|key| {
                path_map.get(&key).cloned().ok_or_else(|| {
                    GraphError::Execution(format!("Router returned unmapped key '{}'", key))
                })
            })
            .collect()
    }
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("path_map", &self.path_map)
            .finish()
    }
}

/// Graph definition
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) nodes: HashMap<NodeId, NodeSpec>,

    /// Node names in insertion order
    pub(crate) node_order: Vec<NodeId>,

    /// Static edges: from -> [to]
    pub(crate) edges: HashMap<NodeId, Vec<NodeId>>,

    /// Conditional edges: from -> branches
    pub(crate) branches: HashMap<NodeId, Vec<Branch>>,

    pub(crate) entry: Option<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_node(&mut self, spec: NodeSpec) -> Result<()> {
        if spec.name == START || spec.name == END {
            return Err(GraphError::Validation(format!(
                "Node name '{}' is reserved",
                spec.name
            )));
        }
        if spec.name.is_empty() {
            return Err(GraphError::Validation("Node name cannot be empty".to_string()));
        }
        if self.nodes.contains_key(&spec.name) {
            return Err(GraphError::Validation(format!(
                "Node '{}' already exists",
                spec.name
            )));
        }
        self.node_order.push(spec.name.clone());
        self.nodes.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub(crate) fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if from == START {
            self.entry = Some(to);
            return;
        }
        let targets = self.edges.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
    }

    pub(crate) fn add_branch(&mut self, from: NodeId, branch: Branch) {
        self.branches.entry(from).or_default().push(branch);
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    /// Node names in insertion order
    pub fn node_names(&self) -> &[NodeId] {
        &self.node_order
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// Static edge targets of a node
    pub fn edges_from(&self, node: &str) -> &[NodeId] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Successors of `node` for the given (already updated) state
    ///
    /// Static edges first, then each branch in registration order.
    pub fn successors(&self, node: &str, state: &Value) -> Result<Vec<NodeId>> {
        let mut next: Vec<NodeId> = self.edges_from(node).to_vec();
        if let Some(branches) = self.branches.get(node) {
            for branch in branches {
                next.extend(branch.resolve(state)?);
            }
        }
        Ok(next)
    }

    /// Check structure before compilation
    pub fn validate(&self) -> Result<()> {
        let entry = self
            .entry
            .as_deref()
            .ok_or_else(|| GraphError::Validation("No entry point set".to_string()))?;
        if !self.nodes.contains_key(entry) {
            return Err(GraphError::Validation(format!(
                "Entry point '{}' does not exist",
                entry
            )));
        }

        for (from, targets) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "Edge source '{}' does not exist",
                    from
                )));
            }
            for to in targets {
                if to != END && !self.nodes.contains_key(to) {
                    return Err(GraphError::Validation(format!(
                        "Edge target '{}' does not exist (from '{}')",
                        to, from
                    )));
                }
            }
        }

        for (from, branches) in &self.branches {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "Conditional edge source '{}' does not exist",
                    from
                )));
            }
            for branch in branches {
                if let Some(path_map) = &branch.path_map {
                    for target in path_map.values() {
                        if target != END && !self.nodes.contains_key(target) {
                            return Err(GraphError::Validation(format!(
                                "Conditional edge target '{}' does not exist (from '{}')",
                                target, from
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
