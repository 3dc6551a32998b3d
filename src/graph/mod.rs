//! The dependency graph and its concurrent executor.
//!
//! A [`Graph`] is a set of [`GraphNode`]s plus dependency edges. Walking
//! it runs nodes as concurrently as the edges allow: a node starts as
//! soon as all of its dependencies have finished cleanly. When a node
//! fails, everything downstream of it is skipped while already-eligible
//! siblings still run. Diagnostics from every node that ran are merged
//! into the walk's result.

pub mod builder;
pub mod node;
pub mod walker;

pub use builder::{
    validate_graph_builder, DestroyPlanGraphBuilder, EvalGraphBuilder, GraphBuild,
    PlanGraphBuilder,
};
pub use node::GraphNode;
pub use walker::{GraphWalker, WalkOperation};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::diagnostics::{Diagnostic, Diagnostics};

/// A directed acyclic dependency graph of executable nodes.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Arc<dyn GraphNode>>,
    /// Edge `(a, b)` means node `a` depends on node `b`.
    edges: Vec<(usize, usize)>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl GraphNode + 'static) -> usize {
        self.nodes.push(Arc::new(node));
        self.nodes.len() - 1
    }

    /// Record that `node` must run after `depends_on`.
    pub fn add_dependency(&mut self, node: usize, depends_on: usize) {
        self.edges.push((node, depends_on));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reject graphs whose dependency edges form a cycle. Builders call
    /// this once after assembly; a cycle is a construction defect, so the
    /// diagnostic is bug-worded.
    #[must_use]
    pub fn check_acyclic(&self) -> Diagnostics {
        let mut petgraph = DiGraph::<usize, ()>::with_capacity(self.nodes.len(), self.edges.len());
        let indices: Vec<_> = (0..self.nodes.len()).map(|i| petgraph.add_node(i)).collect();
        for &(node, dep) in &self.edges {
            petgraph.add_edge(indices[dep], indices[node], ());
        }

        let mut diags = Diagnostics::new();
        if let Err(cycle) = toposort(&petgraph, None) {
            let name = self.nodes[petgraph[cycle.node_id()]].name();
            diags.append(Diagnostic::bug(
                "Cycle in dependency graph",
                format!("The node {name:?} participates in a dependency cycle."),
            ));
        }
        diags
    }

    /// Execute every node against `walker`, honoring dependency order and
    /// running independent nodes concurrently.
    ///
    /// A node whose dependency reported errors is skipped, along with
    /// everything downstream of it; siblings that were already eligible
    /// still run to completion. Merged diagnostics from every executed
    /// node are returned.
    pub async fn walk(&self, walker: Arc<GraphWalker>) -> Diagnostics {
        debug!(nodes = self.nodes.len(), operation = %walker.operation, "walking graph");

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        let mut pending: Vec<usize> = vec![0; self.nodes.len()];
        for &(node, dep) in &self.edges {
            dependents[dep].push(node);
            pending[node] += 1;
        }
        let mut blocked = vec![false; self.nodes.len()];

        let mut tasks: JoinSet<(usize, Diagnostics)> = JoinSet::new();
        let spawn = |tasks: &mut JoinSet<(usize, Diagnostics)>, idx: usize| {
            let node = Arc::clone(&self.nodes[idx]);
            let walker = Arc::clone(&walker);
            tasks.spawn(async move {
                trace!(node = %node.name(), "executing graph node");
                let diags = node.execute(&walker).await;
                (idx, diags)
            });
        };

        for idx in 0..self.nodes.len() {
            if pending[idx] == 0 {
                spawn(&mut tasks, idx);
            }
        }

        let mut diags = Diagnostics::new();
        while let Some(joined) = tasks.join_next().await {
            let (finished, node_diags) = match joined {
                Ok(result) => result,
                Err(err) => {
                    diags.append(Diagnostic::bug(
                        "Graph node panicked",
                        format!("A graph node task failed to complete: {err}."),
                    ));
                    continue;
                }
            };

            if node_diags.has_errors() {
                debug!(node = %self.nodes[finished].name(), "node failed; skipping dependents");
                self.block_downstream(finished, &dependents, &mut blocked);
            }
            diags.extend(node_diags);

            for &dependent in &dependents[finished] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 && !blocked[dependent] {
                    spawn(&mut tasks, dependent);
                }
            }
        }

        debug!(operation = %walker.operation, errors = diags.has_errors(), "graph walk finished");
        diags
    }

    /// Mark everything downstream of `failed` as unrunnable.
    fn block_downstream(&self, failed: usize, dependents: &[Vec<usize>], blocked: &mut [bool]) {
        let mut queue = vec![failed];
        while let Some(idx) = queue.pop() {
            for &dependent in &dependents[idx] {
                if !blocked[dependent] {
                    blocked[dependent] = true;
                    queue.push(dependent);
                }
            }
        }
    }
}
