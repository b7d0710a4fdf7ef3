//! Trigger node: the workflow's entry marker.
//!
//! Trigger payloads are already flattened into the context when the
//! execution is seeded, so the processor just records how the run
//! started. Replayable: it touches nothing external.

use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// How the workflow was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Started by a user action.
    #[default]
    Manual,
    /// Started by an inbound webhook.
    Webhook,
    /// Started by a record lifecycle event.
    RecordEvent,
    /// Started on a schedule.
    Schedule,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerConfig {
    #[serde(default)]
    trigger_type: TriggerKind,
}

/// Processor for [`crate::node::NodeType::Trigger`].
#[derive(Debug, Default)]
pub struct TriggerProcessor;

#[async_trait]
impl NodeProcessor for TriggerProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        _ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: TriggerConfig = parse_config(node)?;
        let kind = match config.trigger_type {
            TriggerKind::Manual => "manual",
            TriggerKind::Webhook => "webhook",
            TriggerKind::RecordEvent => "record_event",
            TriggerKind::Schedule => "schedule",
        };
        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "triggered": true,
            "trigger_type": kind,
        })))
    }

    fn supports_replay(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use relaycrm_core::{ExecutionId, WorkflowId};
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::seed(json!({}), "t", ExecutionId::new(), WorkflowId::new())
    }

    #[tokio::test]
    async fn reports_the_trigger_kind() {
        let node = NodeSpec::new(
            "start",
            NodeType::Trigger,
            json!({"trigger_type": "webhook"}),
        );

        let outcome = TriggerProcessor
            .process(&node, &mut ctx())
            .await
            .expect("process");
        let NodeOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["trigger_type"], json!("webhook"));
        assert_eq!(result["triggered"], json!(true));
    }

    #[tokio::test]
    async fn defaults_to_manual() {
        let node = NodeSpec::new("start", NodeType::Trigger, json!({}));
        let NodeOutcome::Completed(result) = TriggerProcessor
            .process(&node, &mut ctx())
            .await
            .expect("process")
        else {
            panic!("expected completion");
        };
        assert_eq!(result["trigger_type"], json!("manual"));
        assert!(TriggerProcessor.supports_replay());
    }
}
