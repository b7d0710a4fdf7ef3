//! Approval node: creates a request and suspends the execution.
//!
//! The approval carries a sanitized context snapshot (no raw node
//! outputs). Resolving the approval happens outside the engine; the
//! resume entry point picks the execution back up with the decision as
//! the node's output.

use crate::approval::{ApprovalStore, WorkflowApproval};
use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError, SuspendReason};
use crate::template::{self, TemplateMode};
use async_trait::async_trait;
use relaycrm_core::{ExecutionId, UserId};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ApprovalConfig {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    assigned_to: Option<UserId>,
    #[serde(default)]
    timeout_hours: Option<i64>,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for [`crate::node::NodeType::Approval`].
pub struct ApprovalProcessor {
    approvals: Arc<dyn ApprovalStore>,
}

impl ApprovalProcessor {
    /// Creates the processor.
    pub fn new(approvals: Arc<dyn ApprovalStore>) -> Self {
        Self { approvals }
    }
}

#[async_trait]
impl NodeProcessor for ApprovalProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: ApprovalConfig = parse_config(node)?;
        let title = template::resolve(&config.title, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let description = template::resolve(&config.description, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;

        let execution_id = ctx
            .get("execution_id")
            .and_then(JsonValue::as_str)
            .and_then(|s| ExecutionId::from_str(s).ok())
            .ok_or_else(|| ProcessorError::validation("context is missing execution_id"))?;

        let mut approval =
            WorkflowApproval::new(execution_id, title, description, ctx.sanitized());
        if let Some(user_id) = config.assigned_to {
            approval = approval.assigned_to(user_id);
        }
        if let Some(hours) = config.timeout_hours {
            if hours <= 0 {
                return Err(ProcessorError::validation("timeout_hours must be positive"));
            }
            approval = approval.expires_in_hours(hours);
        }

        let approval_id = approval.id;
        self.approvals
            .create(&approval)
            .await
            .map_err(|e| ProcessorError::provider(e.to_string()))?;

        tracing::info!(%approval_id, %execution_id, "approval requested, suspending execution");
        Ok(NodeOutcome::Suspended(SuspendReason::Approval {
            approval_id,
        }))
    }

    fn validate_inputs(
        &self,
        node: &NodeSpec,
        _ctx: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        let config: ApprovalConfig = parse_config(node)?;
        if config.title.trim().is_empty() {
            return Err(ProcessorError::validation("approval title must not be empty"));
        }
        Ok(())
    }
}
