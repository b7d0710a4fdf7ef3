//! Condition node: picks an output branch label from the context.
//!
//! Pure over the context: evaluation never mutates anything, so the node
//! is replayable and re-evaluation yields the same label.

use crate::condition::{evaluate_clauses, ConditionClause};
use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

fn default_output() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
struct ConditionConfig {
    #[serde(default)]
    conditions: Vec<ConditionClause>,
    #[serde(default = "default_output")]
    default_output: String,
}

/// Processor for [`crate::node::NodeType::Condition`].
#[derive(Debug, Default)]
pub struct ConditionProcessor;

#[async_trait]
impl NodeProcessor for ConditionProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: ConditionConfig = parse_config(node)?;
        let data = ctx.snapshot();
        let outcome = evaluate_clauses(&config.conditions, &config.default_output, &data)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;

        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "output": outcome.output,
            "condition_met": outcome.condition_met,
            "matched_condition_index": outcome.matched_condition_index,
        })))
    }

    fn supports_replay(&self) -> bool {
        true
    }
}
