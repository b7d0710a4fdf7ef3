//! Core domain types for relaycrm.
//!
//! This crate provides the foundational strongly-typed identifiers used
//! throughout the relaycrm communications and workflow-automation platform.

pub mod id;

pub use id::{
    ApprovalId, ConnectionId, ExecutionId, ExecutionLogId, MessageId, TenantId, UserId, WorkflowId,
};
