//! Workflow execution engine for the relaycrm platform.
//!
//! This crate runs multi-tenant CRM automation workflows:
//!
//! - **Graph Model**: Directed node/edge definitions validated with petgraph
//! - **Engine**: Dependency-ordered traversal with per-node logging and checkpoints
//! - **Node Processors**: AI, sends, record CRUD, conditions, waits, HTTP, approvals,
//!   sub-workflows, fan-out, and data merging behind one trait
//! - **Pause/Resume**: Approval gates suspend an execution and resume it later
//!   from a persisted context snapshot
//! - **Broadcasting**: Fire-and-forget execution events over NATS

pub mod approval;
pub mod broadcast;
pub mod condition;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod execution;
pub mod graph;
pub mod nats;
pub mod node;
pub mod nodes;
pub mod processor;
pub mod template;

pub use approval::{ApprovalStatus, ApprovalStore, InMemoryApprovalStore, WorkflowApproval};
pub use broadcast::{Broadcaster, Envelope, ExecutionEvent, NullBroadcaster};
pub use condition::{ConditionClause, ConditionOperator, ConditionOutcome, LogicOperator, Operand};
pub use context::ExecutionContext;
pub use definition::{InMemoryWorkflowRepo, Workflow, WorkflowRepo};
pub use engine::{EngineConfig, WorkflowEngine};
pub use error::{EngineError, GraphError};
pub use execution::{
    ExecutionLog, ExecutionStatus, ExecutionStore, InMemoryExecutionStore, LogStatus, ResumeToken,
    WorkflowExecution,
};
pub use graph::ExecutionGraph;
pub use nats::{NatsBroadcaster, NatsConfig};
pub use node::{EdgeSpec, NodeId, NodeSpec, NodeType};
pub use nodes::{default_registry, ProcessorServices};
pub use processor::{NodeOutcome, NodeProcessor, ProcessorError, ProcessorRegistry, SuspendReason};
pub use template::TemplateMode;
