//! Workflow node and edge specifications.
//!
//! Nodes are the building blocks of workflows. A node spec carries:
//! - An opaque ID assigned by the workflow editor
//! - A registered node type (resolved to a processor at execution time)
//! - Type-specific configuration as raw JSON
//! - The `continue_on_error` traversal flag

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A unique identifier for a node within a workflow.
///
/// Node IDs originate in stored workflow definitions (editor-assigned
/// strings like `"send-intro-email"`), so unlike the platform's ULID ids
/// this is an opaque string wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The registered node types the engine can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Workflow entry point (manual, webhook, record event, schedule).
    Trigger,
    /// Single-shot AI completion over a templated prompt.
    AiPrompt,
    /// AI analysis (sentiment, summary, classification) of context data.
    AiAnalysis,
    /// Send an email through the user's email connection.
    EmailSend,
    /// Send a WhatsApp message.
    WhatsappSend,
    /// Send a LinkedIn message.
    LinkedinSend,
    /// Send an SMS.
    SmsSend,
    /// Create a CRM record.
    RecordCreate,
    /// Update a CRM record.
    RecordUpdate,
    /// Delete a CRM record.
    RecordDelete,
    /// Find CRM records by filter.
    RecordFind,
    /// Evaluate an ordered clause list to pick an output branch label.
    Condition,
    /// Fan out processing over an array from the context.
    ForEach,
    /// Suspend for a duration, until a datetime, or until business hours.
    WaitDelay,
    /// Poll for an inbound reply on a conversation.
    WaitForResponse,
    /// Poll for a record lifecycle event.
    WaitForRecordEvent,
    /// Poll external data until a condition tree holds.
    WaitForCondition,
    /// Generic outbound HTTP request.
    HttpRequest,
    /// Outbound webhook notification.
    WebhookOut,
    /// Human approval gate; pauses the execution.
    Approval,
    /// Invoke another workflow by ID and wait for it.
    SubWorkflow,
    /// Invoke a named reusable workflow.
    ReusableWorkflow,
    /// Combine data sources into one value.
    MergeData,
}

impl NodeType {
    /// Every known node type, in declaration order.
    pub const ALL: [NodeType; 23] = [
        Self::Trigger,
        Self::AiPrompt,
        Self::AiAnalysis,
        Self::EmailSend,
        Self::WhatsappSend,
        Self::LinkedinSend,
        Self::SmsSend,
        Self::RecordCreate,
        Self::RecordUpdate,
        Self::RecordDelete,
        Self::RecordFind,
        Self::Condition,
        Self::ForEach,
        Self::WaitDelay,
        Self::WaitForResponse,
        Self::WaitForRecordEvent,
        Self::WaitForCondition,
        Self::HttpRequest,
        Self::WebhookOut,
        Self::Approval,
        Self::SubWorkflow,
        Self::ReusableWorkflow,
        Self::MergeData,
    ];

    /// Whether a provider-side failure in this node aborts the execution.
    ///
    /// Communication sends and outbound webhooks are expected to fail
    /// sometimes; their provider failures surface as soft
    /// `{success: false, error}` outputs that downstream nodes can inspect.
    /// Validation and configuration errors abort regardless of this flag.
    #[must_use]
    pub fn aborts_on_provider_failure(&self) -> bool {
        !matches!(
            self,
            Self::EmailSend
                | Self::WhatsappSend
                | Self::LinkedinSend
                | Self::SmsSend
                | Self::WebhookOut
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        match json {
            JsonValue::String(s) => f.write_str(&s),
            _ => Err(fmt::Error),
        }
    }
}

/// One unit of work in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier within the workflow.
    pub id: NodeId,
    /// The node type, resolved against the processor registry.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Human-readable name for logs and the editor.
    #[serde(default)]
    pub name: String,
    /// Type-specific configuration.
    #[serde(default)]
    pub config: JsonValue,
    /// Allows traversal to proceed past this node's failure.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl NodeSpec {
    /// Creates a node spec with the given ID, type, and configuration.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, node_type: NodeType, config: JsonValue) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            node_type,
            config,
            continue_on_error: false,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Marks the node as continue-on-error.
    #[must_use]
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// The upstream node.
    pub source: NodeId,
    /// The downstream node.
    pub target: NodeId,
}

impl EdgeSpec {
    /// Creates an edge from source to target.
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for EdgeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}
