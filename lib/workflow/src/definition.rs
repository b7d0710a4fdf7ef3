//! Workflow definitions and their repository seam.

use crate::error::GraphError;
use crate::graph::ExecutionGraph;
use crate::node::{EdgeSpec, NodeId, NodeSpec, NodeType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaycrm_core::WorkflowId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::RwLock;

/// A stored workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier.
    pub id: WorkflowId,
    /// Display name.
    pub name: String,
    /// Optional description for the editor.
    #[serde(default)]
    pub description: String,
    /// Whether triggers may start this workflow.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Name under which other workflows may invoke this one; reusable
    /// workflows are invoked by name instead of ID.
    #[serde(default)]
    pub reusable_name: Option<String>,
    /// The node set.
    pub nodes: Vec<NodeSpec>,
    /// The edge set.
    pub edges: Vec<EdgeSpec>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Workflow {
    /// Creates an empty workflow with a fresh ID.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            reusable_name: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, id: impl Into<NodeId>, node_type: NodeType, config: JsonValue) -> Self {
        self.nodes.push(NodeSpec::new(id, node_type, config));
        self
    }

    /// Adds a prebuilt node spec.
    #[must_use]
    pub fn with_spec(mut self, spec: NodeSpec) -> Self {
        self.nodes.push(spec);
        self
    }

    /// Adds an edge.
    #[must_use]
    pub fn with_edge(mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        self.edges.push(EdgeSpec::new(source, target));
        self
    }

    /// Marks the workflow as reusable under the given name.
    #[must_use]
    pub fn reusable_as(mut self, name: impl Into<String>) -> Self {
        self.reusable_name = Some(name.into());
        self
    }

    /// Returns the node with the given ID.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Checks the definition can be turned into an execution graph.
    pub fn validate(&self) -> Result<(), GraphError> {
        ExecutionGraph::build(&self.nodes, &self.edges).map(|_| ())
    }
}

/// Repository of workflow definitions.
#[async_trait]
pub trait WorkflowRepo: Send + Sync {
    /// Fetches a workflow by ID.
    async fn workflow(&self, id: WorkflowId) -> Option<Workflow>;

    /// Fetches a reusable workflow by its registered name.
    async fn reusable(&self, name: &str) -> Option<Workflow>;
}

/// In-memory `WorkflowRepo` used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepo {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
}

impl InMemoryWorkflowRepo {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a workflow.
    pub fn insert(&self, workflow: Workflow) {
        self.workflows
            .write()
            .expect("workflow repo lock poisoned")
            .insert(workflow.id, workflow);
    }
}

#[async_trait]
impl WorkflowRepo for InMemoryWorkflowRepo {
    async fn workflow(&self, id: WorkflowId) -> Option<Workflow> {
        self.workflows
            .read()
            .expect("workflow repo lock poisoned")
            .get(&id)
            .cloned()
    }

    async fn reusable(&self, name: &str) -> Option<Workflow> {
        self.workflows
            .read()
            .expect("workflow repo lock poisoned")
            .values()
            .find(|w| w.reusable_name.as_deref() == Some(name))
            .cloned()
    }
}
