// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution DAG
//!
//! Typed directed-acyclic-graph model the [planner](crate) compiles
//! pipelines into and the executor traverses. Nodes represent operations;
//! edges carry data between them, distinguished by a named port for
//! multi-input nodes (a `join`'s secondary input, a `branch`'s routes).
//!
//! Topological sort, parallel-level grouping, and the graph mutations used
//! by the optimizer passes (`remove_node`, `redirect_edges`,
//! `swap_adjacent`) all live here; the optimizer passes themselves live in
//! `pipeline-engine` since they reason about step metadata, which is an
//! infrastructure-registered concern.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::value::Value;

/// A single operation in the execution graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    pub id: String,
    /// Registered step name, or `"_fused"` for a planner-merged node.
    pub step_type: String,
    pub config: IndexMap<String, Value>,
    /// Resolved by the planner's strategy-annotation pass; `"sync"` until
    /// then.
    pub strategy: String,
    pub estimated_rows: Option<usize>,
    pub parallel_level: usize,
}

impl DagNode {
    pub fn new(id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step_type: step_type.into(),
            config: IndexMap::new(),
            strategy: "sync".to_string(),
            estimated_rows: None,
            parallel_level: 0,
        }
    }

    pub fn with_config(mut self, config: IndexMap<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Config with planner-internal keys (leading `_`) stripped, ready to
    /// hand to a step's `execute()`.
    pub fn public_config(&self) -> IndexMap<String, Value> {
        self.config
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Directed data-flow connection between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagEdge {
    pub source: String,
    pub target: String,
    pub port: String,
}

impl DagEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            port: "default".to_string(),
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }
}

/// Directed acyclic graph of pipeline operations.
#[derive(Debug, Clone, Default)]
pub struct ExecutionDAG {
    pub nodes: IndexMap<String, DagNode>,
    pub edges: Vec<DagEdge>,
}

impl ExecutionDAG {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Construction -----------------------------------------------------

    pub fn add_node(&mut self, node: DagNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn add_edge(&mut self, source: impl Into<String>, target: impl Into<String>, port: impl Into<String>) {
        self.edges.push(DagEdge {
            source: source.into(),
            target: target.into(),
            port: port.into(),
        });
    }

    // --- Queries ------------------------------------------------------------

    pub fn predecessors(&self, node_id: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.target == node_id)
            .map(|e| e.source.clone())
            .collect()
    }

    pub fn successors(&self, node_id: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.source == node_id)
            .map(|e| e.target.clone())
            .collect()
    }

    pub fn in_edges(&self, node_id: &str) -> Vec<&DagEdge> {
        self.edges.iter().filter(|e| e.target == node_id).collect()
    }

    /// Nodes with no incoming edges (data sources).
    pub fn roots(&self) -> Vec<String> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        self.nodes
            .keys()
            .filter(|id| !targets.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// Nodes with no outgoing edges (sinks), in node-insertion order.
    pub fn leaves(&self) -> Vec<String> {
        let sources: HashSet<&str> = self.edges.iter().map(|e| e.source.as_str()).collect();
        self.nodes
            .keys()
            .filter(|id| !sources.contains(id.as_str()))
            .cloned()
            .collect()
    }

    // --- Ordering -----------------------------------------------------------

    /// Kahn's algorithm. Returns [`PipelineError::Internal`] if the graph
    /// contains a cycle (every optimizer pass, and execution itself, relies
    /// on this never happening for a planner-produced DAG; a residual node
    /// set after the queue drains means a defect upstream, not bad user
    /// input, since the planner is supposed to have rejected cyclic graphs
    /// at compile time).
    pub fn topological_sort(&self) -> Result<Vec<String>, PipelineError> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        for edge in &self.edges {
            *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
        }

        // Stable order: seed the queue by node insertion order rather than
        // hash order, so topological_sort is deterministic for equal DAGs.
        let mut queue: VecDeque<String> = self
            .nodes
            .keys()
            .filter(|id| in_degree[id.as_str()] == 0)
            .cloned()
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(nid) = queue.pop_front() {
            order.push(nid.clone());
            for succ in self.successors(&nid) {
                if let Some(deg) = in_degree.get_mut(succ.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(succ);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(PipelineError::Internal(
                "ExecutionDAG contains a cycle".to_string(),
            ));
        }
        Ok(order)
    }

    /// Group nodes into execution levels: `level(n) = 1 + max(level(p) for p
    /// in predecessors(n))`, or `0` if `n` has no predecessors. Nodes in the
    /// same level have no dependency on one another and may run
    /// concurrently.
    pub fn parallel_groups(&self) -> Result<Vec<Vec<String>>, PipelineError> {
        let order = self.topological_sort()?;
        let mut level_of: HashMap<String, usize> = HashMap::new();

        for nid in &order {
            let preds = self.predecessors(nid);
            let level = if preds.is_empty() {
                0
            } else {
                preds.iter().map(|p| level_of[p]).max().unwrap() + 1
            };
            level_of.insert(nid.clone(), level);
        }

        let max_level = level_of.values().copied().max().unwrap_or(0);
        let mut by_level: Vec<Vec<String>> = vec![Vec::new(); max_level + 1];
        for nid in &order {
            by_level[level_of[nid]].push(nid.clone());
        }
        Ok(by_level)
    }

    // --- Mutation (used by optimization passes) -----------------------------

    /// Remove a node and all its edges.
    pub fn remove_node(&mut self, node_id: &str) {
        self.nodes.shift_remove(node_id);
        self.edges
            .retain(|e| e.source != node_id && e.target != node_id);
    }

    /// Redirect all outgoing edges from `old_source` to originate from
    /// `new_source`.
    pub fn redirect_edges(&mut self, old_source: &str, new_source: &str) {
        for edge in &mut self.edges {
            if edge.source == old_source {
                edge.source = new_source.to_string();
            }
        }
    }

    /// Swap two adjacent nodes: `... -> A -> B -> ...` becomes
    /// `... -> B -> A -> ...`.
    ///
    /// Precondition (enforced by the caller, the filter-pushdown pass):
    /// there is an edge `A -> B`, `A` has exactly one successor, and `B` has
    /// exactly one predecessor.
    pub fn swap_adjacent(&mut self, a_id: &str, b_id: &str) {
        let mut new_edges = Vec::with_capacity(self.edges.len());
        for e in &self.edges {
            if e.source == a_id && e.target == b_id {
                new_edges.push(DagEdge {
                    source: b_id.to_string(),
                    target: a_id.to_string(),
                    port: e.port.clone(),
                });
            } else if e.target == a_id {
                new_edges.push(DagEdge {
                    source: e.source.clone(),
                    target: b_id.to_string(),
                    port: e.port.clone(),
                });
            } else if e.source == b_id {
                new_edges.push(DagEdge {
                    source: a_id.to_string(),
                    target: e.target.clone(),
                    port: e.port.clone(),
                });
            } else {
                new_edges.push(e.clone());
            }
        }
        self.edges = new_edges;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> ExecutionDAG {
        let mut dag = ExecutionDAG::new();
        for i in 0..n {
            dag.add_node(DagNode::new(format!("s{i}"), "transform"));
            if i > 0 {
                dag.add_edge(format!("s{}", i - 1), format!("s{i}"), "default");
            }
        }
        dag
    }

    #[test]
    fn topological_sort_respects_chain_order() {
        let dag = chain(3);
        assert_eq!(dag.topological_sort().unwrap(), vec!["s0", "s1", "s2"]);
    }

    #[test]
    fn self_loop_raises_cycle_error() {
        let mut dag = ExecutionDAG::new();
        dag.add_node(DagNode::new("a", "transform"));
        dag.add_edge("a", "a", "default");
        assert!(dag.topological_sort().is_err());
    }

    #[test]
    fn parallel_levels_satisfy_edge_ordering() {
        let mut dag = ExecutionDAG::new();
        for id in ["r", "a", "b", "s"] {
            dag.add_node(DagNode::new(id, "transform"));
        }
        dag.add_edge("r", "a", "default");
        dag.add_edge("r", "b", "default");
        dag.add_edge("a", "s", "input_0");
        dag.add_edge("b", "s", "input_1");

        let groups = dag.parallel_groups().unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], vec!["r"]);
        let mut mid = groups[1].clone();
        mid.sort();
        assert_eq!(mid, vec!["a", "b"]);
        assert_eq!(groups[2], vec!["s"]);
    }

    #[test]
    fn swap_adjacent_reverses_direct_edge_and_rewires_neighbors() {
        let mut dag = ExecutionDAG::new();
        dag.add_node(DagNode::new("p", "transform"));
        dag.add_node(DagNode::new("a", "transform"));
        dag.add_node(DagNode::new("b", "transform"));
        dag.add_edge("p", "a", "default");
        dag.add_edge("a", "b", "default");

        dag.swap_adjacent("a", "b");

        assert_eq!(dag.predecessors("a"), vec!["b".to_string()]);
        assert_eq!(dag.predecessors("b"), vec!["p".to_string()]);
    }
}
