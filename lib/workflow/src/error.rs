//! Engine-level error types.
//!
//! Structural problems (bad graph, unknown node type, store failures) are
//! engine errors and surface to the caller. Failures inside a node are
//! `ProcessorError`s and are handled by the traversal's failure policy
//! instead.

use crate::node::{EdgeSpec, NodeId, NodeType};
use relaycrm_core::ExecutionId;
use std::error::Error;
use std::fmt;

/// A workflow definition that cannot be turned into an execution graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two nodes share the same ID.
    DuplicateNodeId {
        /// The repeated ID.
        node_id: NodeId,
    },
    /// Edges referencing nodes that do not exist.
    DanglingEdges {
        /// Every offending edge, for a single actionable report.
        edges: Vec<EdgeSpec>,
    },
    /// The edge set contains a cycle.
    CycleDetected,
    /// A requested start node is not in the graph.
    UnknownStartNode {
        /// The missing node.
        node_id: NodeId,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => {
                write!(f, "duplicate node id in workflow: {node_id}")
            }
            Self::DanglingEdges { edges } => {
                let listed: Vec<String> = edges.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "edges reference nodes not present in the workflow: {}",
                    listed.join(", ")
                )
            }
            Self::CycleDetected => write!(f, "workflow graph contains a cycle"),
            Self::UnknownStartNode { node_id } => {
                write!(f, "start node not found in workflow: {node_id}")
            }
        }
    }
}

impl Error for GraphError {}

/// Errors surfaced by the engine's entry points.
#[derive(Debug)]
pub enum EngineError {
    /// The workflow definition is structurally invalid.
    Graph(GraphError),
    /// A node names a type with no registered processor.
    UnknownNodeType {
        /// The node carrying the unknown type.
        node_id: NodeId,
        /// The unregistered type.
        node_type: NodeType,
    },
    /// No execution exists with the given ID.
    ExecutionNotFound {
        /// The missing execution.
        execution_id: ExecutionId,
    },
    /// A resume was requested for an execution that is not paused.
    NotPaused {
        /// The execution in question.
        execution_id: ExecutionId,
    },
    /// A paused execution has no persisted resume token.
    MissingResumeToken {
        /// The execution in question.
        execution_id: ExecutionId,
    },
    /// The backing store failed.
    Store {
        /// What the store reported.
        message: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph(e) => write!(f, "invalid workflow graph: {e}"),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "node {node_id} has unregistered type {node_type}")
            }
            Self::ExecutionNotFound { execution_id } => {
                write!(f, "execution not found: {execution_id}")
            }
            Self::NotPaused { execution_id } => {
                write!(f, "execution {execution_id} is not paused")
            }
            Self::MissingResumeToken { execution_id } => {
                write!(f, "no resume token stored for execution {execution_id}")
            }
            Self::Store { message } => write!(f, "execution store failure: {message}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<crate::execution::StoreError> for EngineError {
    fn from(e: crate::execution::StoreError) -> Self {
        Self::Store {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::EdgeSpec;

    #[test]
    fn dangling_edges_lists_every_offender() {
        let err = GraphError::DanglingEdges {
            edges: vec![EdgeSpec::new("a", "ghost"), EdgeSpec::new("ghost2", "a")],
        };
        let message = err.to_string();
        assert!(message.contains("a -> ghost"));
        assert!(message.contains("ghost2 -> a"));
    }

    #[test]
    fn engine_error_wraps_graph_error() {
        let err = EngineError::from(GraphError::CycleDetected);
        assert!(err.to_string().contains("cycle"));
    }
}
