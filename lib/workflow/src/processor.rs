//! The node processor contract and registry.
//!
//! Every node type maps to exactly one processor. Processors receive the
//! node spec plus the mutable execution context and report either a JSON
//! result or a suspension; everything that can go wrong is a
//! `ProcessorError`, classified so the engine's failure policy can tell
//! provider trouble from bad configuration.

use crate::context::ExecutionContext;
use crate::node::{NodeSpec, NodeType};
use async_trait::async_trait;
use relaycrm_core::ApprovalId;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Failure inside a node processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// Inputs or resolved templates are invalid. Always aborts.
    Validation {
        /// What was wrong.
        message: String,
    },
    /// The node's configuration cannot be parsed. Always aborts.
    Config {
        /// What was wrong.
        message: String,
    },
    /// An external provider failed. Abort is per the node type's policy.
    Provider {
        /// What the provider reported.
        message: String,
    },
    /// The node ran out of time waiting on something external.
    Timeout {
        /// What timed out.
        message: String,
    },
}

impl ProcessorError {
    /// Validation error constructor.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Config error constructor.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Provider error constructor.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Timeout error constructor.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Short classification label for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Config { .. } => "config",
            Self::Provider { .. } => "provider",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message } => write!(f, "validation failed: {message}"),
            Self::Config { message } => write!(f, "invalid node config: {message}"),
            Self::Provider { message } => write!(f, "provider failure: {message}"),
            Self::Timeout { message } => write!(f, "timed out: {message}"),
        }
    }
}

impl Error for ProcessorError {}

/// Why a node suspended its execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspendReason {
    /// Waiting on a human approval decision.
    Approval {
        /// The created approval request.
        approval_id: ApprovalId,
    },
}

/// What a processor produced.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// The node finished with this result.
    Completed(JsonValue),
    /// The node suspended the whole execution.
    Suspended(SuspendReason),
}

/// The contract every node type implements.
#[async_trait]
pub trait NodeProcessor: Send + Sync {
    /// Executes the node.
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError>;

    /// Pre-flight check run before `process`; failures abort the node.
    fn validate_inputs(
        &self,
        _node: &NodeSpec,
        _ctx: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Resolved inputs captured into the node log before execution.
    ///
    /// Implementations return `None` when inputs cannot be resolved yet;
    /// the raw config is logged instead.
    fn create_checkpoint(&self, _node: &NodeSpec, _ctx: &ExecutionContext) -> Option<JsonValue> {
        None
    }

    /// Whether re-running the node with checkpointed inputs is safe.
    fn supports_replay(&self) -> bool {
        false
    }
}

/// Parses a node's config into a typed struct.
pub fn parse_config<T: DeserializeOwned>(node: &NodeSpec) -> Result<T, ProcessorError> {
    serde_json::from_value(node.config.clone())
        .map_err(|e| ProcessorError::config(format!("node {}: {e}", node.id)))
}

/// Maps node types to their processors.
///
/// A node whose type has no registration is a hard engine error, never a
/// silent skip.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<NodeType, Arc<dyn NodeProcessor>>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a processor for a node type, replacing any previous one.
    pub fn register(&mut self, node_type: NodeType, processor: Arc<dyn NodeProcessor>) {
        self.processors.insert(node_type, processor);
    }

    /// Looks up the processor for a node type.
    #[must_use]
    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeProcessor>> {
        self.processors.get(&node_type).cloned()
    }

    /// Registered node types.
    #[must_use]
    pub fn registered_types(&self) -> Vec<NodeType> {
        self.processors.keys().copied().collect()
    }
}
