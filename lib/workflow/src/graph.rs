//! Dependency graph construction and validation.
//!
//! Built once per execution from the definition's node and edge lists.
//! Construction rejects duplicate node IDs, dangling edges (all offenders
//! reported together), and cycles, so the traversal can rely on a sound
//! DAG.

use crate::error::GraphError;
use crate::node::{EdgeSpec, NodeId, NodeSpec};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use std::collections::HashMap;

/// A node with its resolved dependency lists.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// The node's specification.
    pub spec: NodeSpec,
    /// Upstream node IDs, in edge order.
    pub dependencies: Vec<NodeId>,
    /// Downstream node IDs, in edge order.
    pub dependents: Vec<NodeId>,
}

/// A validated workflow DAG.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    nodes: HashMap<NodeId, GraphNode>,
    // Definition order, for deterministic entry-node seeding.
    order: Vec<NodeId>,
}

impl ExecutionGraph {
    /// Builds and validates the graph.
    pub fn build(nodes: &[NodeSpec], edges: &[EdgeSpec]) -> Result<Self, GraphError> {
        let mut graph_nodes: HashMap<NodeId, GraphNode> = HashMap::with_capacity(nodes.len());
        let mut order = Vec::with_capacity(nodes.len());
        for spec in nodes {
            if graph_nodes.contains_key(&spec.id) {
                return Err(GraphError::DuplicateNodeId {
                    node_id: spec.id.clone(),
                });
            }
            order.push(spec.id.clone());
            graph_nodes.insert(
                spec.id.clone(),
                GraphNode {
                    spec: spec.clone(),
                    dependencies: Vec::new(),
                    dependents: Vec::new(),
                },
            );
        }

        let dangling: Vec<EdgeSpec> = edges
            .iter()
            .filter(|e| {
                !graph_nodes.contains_key(&e.source) || !graph_nodes.contains_key(&e.target)
            })
            .cloned()
            .collect();
        if !dangling.is_empty() {
            return Err(GraphError::DanglingEdges { edges: dangling });
        }

        let mut petgraph: DiGraph<&NodeId, ()> = DiGraph::new();
        let mut indices = HashMap::with_capacity(order.len());
        for id in &order {
            indices.insert(id.clone(), petgraph.add_node(id));
        }
        for edge in edges {
            petgraph.add_edge(indices[&edge.source], indices[&edge.target], ());
        }
        if is_cyclic_directed(&petgraph) {
            return Err(GraphError::CycleDetected);
        }

        for edge in edges {
            if let Some(target) = graph_nodes.get_mut(&edge.target) {
                target.dependencies.push(edge.source.clone());
            }
            if let Some(source) = graph_nodes.get_mut(&edge.source) {
                source.dependents.push(edge.target.clone());
            }
        }

        Ok(Self {
            nodes: graph_nodes,
            order,
        })
    }

    /// Returns a node by ID.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Whether the graph contains a node.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes with no dependencies, in definition order.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|id| {
                self.nodes
                    .get(*id)
                    .is_some_and(|n| n.dependencies.is_empty())
            })
            .cloned()
            .collect()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use serde_json::json;

    fn node(id: &str) -> NodeSpec {
        NodeSpec::new(id, NodeType::MergeData, json!({}))
    }

    #[test]
    fn builds_dependency_lists_from_edges() {
        let graph = ExecutionGraph::build(
            &[node("a"), node("b"), node("c")],
            &[EdgeSpec::new("a", "b"), EdgeSpec::new("a", "c"), EdgeSpec::new("b", "c")],
        )
        .expect("build");

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.entry_nodes(), vec![NodeId::new("a")]);
        let c = graph.node(&NodeId::new("c")).expect("node c");
        assert_eq!(c.dependencies, vec![NodeId::new("a"), NodeId::new("b")]);
        let a = graph.node(&NodeId::new("a")).expect("node a");
        assert_eq!(a.dependents, vec![NodeId::new("b"), NodeId::new("c")]);
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let result = ExecutionGraph::build(&[node("a"), node("a")], &[]);
        assert!(matches!(result, Err(GraphError::DuplicateNodeId { .. })));
    }

    #[test]
    fn rejects_dangling_edges_listing_all_offenders() {
        let result = ExecutionGraph::build(
            &[node("a")],
            &[EdgeSpec::new("a", "ghost"), EdgeSpec::new("phantom", "a")],
        );

        let Err(GraphError::DanglingEdges { edges }) = result else {
            panic!("expected dangling edge error");
        };
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn rejects_cycles() {
        let result = ExecutionGraph::build(
            &[node("a"), node("b")],
            &[EdgeSpec::new("a", "b"), EdgeSpec::new("b", "a")],
        );
        assert!(matches!(result, Err(GraphError::CycleDetected)));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let result = ExecutionGraph::build(&[node("a")], &[EdgeSpec::new("a", "a")]);
        assert!(matches!(result, Err(GraphError::CycleDetected)));
    }

    #[test]
    fn disconnected_nodes_are_all_entry_nodes() {
        let graph = ExecutionGraph::build(&[node("x"), node("y")], &[]).expect("build");
        assert_eq!(graph.entry_nodes(), vec![NodeId::new("x"), NodeId::new("y")]);
    }

    #[test]
    fn empty_graph_is_valid() {
        let graph = ExecutionGraph::build(&[], &[]).expect("build");
        assert!(graph.is_empty());
        assert!(graph.entry_nodes().is_empty());
    }
}
