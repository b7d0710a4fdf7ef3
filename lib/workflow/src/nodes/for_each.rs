//! For-each node: fan out over an array from the context.
//!
//! Three modes: `simple` applies an inline operation per item,
//! `sub_workflow` and `reusable_workflow` launch one child execution per
//! item with bounded concurrency. Per-item failures never abort the loop;
//! the node aggregates successes, failures, and a success rate.

use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::nodes::sub_workflow::SubWorkflowRunner;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use crate::template::{self, TemplateMode};
use async_trait::async_trait;
use relaycrm_core::WorkflowId;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::Semaphore;

const DEFAULT_CONCURRENCY: usize = 4;

/// How each item is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForEachMode {
    /// Apply the inline operation.
    #[default]
    Simple,
    /// Run a child workflow (by ID) per item.
    SubWorkflow,
    /// Run a reusable workflow (by name) per item.
    ReusableWorkflow,
}

/// Inline operation for `simple` mode.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SimpleOperation {
    /// Pass the item through unchanged.
    #[default]
    Identity,
    /// Render a template with `item` and `index` in scope.
    Format {
        /// The template.
        template: String,
    },
    /// Pull one field out of each item.
    ExtractField {
        /// The field name.
        field: String,
    },
}

#[derive(Debug, Deserialize)]
struct ForEachConfig {
    /// Dotted context path to the array.
    items_path: String,
    #[serde(default)]
    mode: ForEachMode,
    #[serde(default)]
    operation: SimpleOperation,
    #[serde(default)]
    sub_workflow_id: Option<WorkflowId>,
    #[serde(default)]
    workflow_name: Option<String>,
    #[serde(default = "default_concurrency")]
    max_concurrency: usize,
    #[serde(default)]
    template_mode: TemplateMode,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn empty_result() -> JsonValue {
    json!({
        "success": true,
        "items_processed": 0,
        "succeeded": 0,
        "failed": 0,
        "success_rate": 1.0,
        "results": [],
    })
}

fn aggregate(results: Vec<(usize, Result<JsonValue, String>)>) -> JsonValue {
    let total = results.len();
    let mut succeeded = 0usize;
    let entries: Vec<JsonValue> = results
        .into_iter()
        .map(|(index, result)| match result {
            Ok(output) => {
                succeeded += 1;
                json!({"index": index, "success": true, "output": output})
            }
            Err(error) => json!({"index": index, "success": false, "error": error}),
        })
        .collect();
    let failed = total - succeeded;
    json!({
        "success": failed == 0,
        "items_processed": total,
        "succeeded": succeeded,
        "failed": failed,
        "success_rate": succeeded as f64 / total as f64,
        "results": entries,
    })
}

/// Processor for [`crate::node::NodeType::ForEach`].
pub struct ForEachProcessor {
    runner: Arc<dyn SubWorkflowRunner>,
}

impl ForEachProcessor {
    /// Creates the processor.
    pub fn new(runner: Arc<dyn SubWorkflowRunner>) -> Self {
        Self { runner }
    }

    fn apply_simple(
        operation: &SimpleOperation,
        item: &JsonValue,
        index: usize,
        base: &ExecutionContext,
        mode: TemplateMode,
    ) -> Result<JsonValue, String> {
        match operation {
            SimpleOperation::Identity => Ok(item.clone()),
            SimpleOperation::Format { template: text } => {
                let mut scope = base.clone();
                scope.insert("item", item.clone());
                scope.insert("index", json!(index));
                template::resolve(text, &scope, mode)
                    .map(JsonValue::String)
                    .map_err(|e| e.to_string())
            }
            SimpleOperation::ExtractField { field } => item
                .get(field)
                .cloned()
                .ok_or_else(|| format!("item has no field {field:?}")),
        }
    }

    async fn run_children(
        &self,
        config: &ForEachConfig,
        items: Vec<JsonValue>,
        parent_execution_id: Option<&JsonValue>,
    ) -> Result<Vec<(usize, Result<JsonValue, String>)>, ProcessorError> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let parent = parent_execution_id.cloned().unwrap_or(JsonValue::Null);

        let tasks = items.into_iter().enumerate().map(|(index, item)| {
            let semaphore = semaphore.clone();
            let runner = self.runner.clone();
            let seed = json!({
                "item": item,
                "index": index,
                "parent_execution_id": parent,
            });
            let workflow_id = config.sub_workflow_id;
            let workflow_name = config.workflow_name.clone();
            let mode = config.mode;
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err("concurrency limiter closed".to_string())),
                };
                let result = match mode {
                    ForEachMode::SubWorkflow => {
                        let Some(workflow_id) = workflow_id else {
                            return (index, Err("sub_workflow_id is not set".to_string()));
                        };
                        runner.run(workflow_id, seed).await
                    }
                    ForEachMode::ReusableWorkflow => {
                        let Some(name) = workflow_name else {
                            return (index, Err("workflow_name is not set".to_string()));
                        };
                        runner.run_reusable(&name, seed).await
                    }
                    ForEachMode::Simple => unreachable!("simple mode never spawns children"),
                };
                (index, result.map_err(|e| e.to_string()))
            }
        });

        let mut results = futures::future::join_all(tasks).await;
        results.sort_by_key(|(index, _)| *index);
        Ok(results)
    }
}

#[async_trait]
impl NodeProcessor for ForEachProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: ForEachConfig = parse_config(node)?;
        let items = match ctx.lookup_path(&config.items_path) {
            Some(JsonValue::Array(items)) => items.clone(),
            Some(other) => {
                return Err(ProcessorError::validation(format!(
                    "items_path must point at an array, found {other}"
                )));
            }
            None => {
                return Err(ProcessorError::validation(format!(
                    "items_path does not resolve: {}",
                    config.items_path
                )));
            }
        };
        if items.is_empty() {
            return Ok(NodeOutcome::Completed(empty_result()));
        }

        let results = match config.mode {
            ForEachMode::Simple => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    (
                        index,
                        Self::apply_simple(
                            &config.operation,
                            item,
                            index,
                            ctx,
                            config.template_mode,
                        ),
                    )
                })
                .collect(),
            ForEachMode::SubWorkflow | ForEachMode::ReusableWorkflow => {
                self.run_children(&config, items, ctx.get("execution_id"))
                    .await?
            }
        };

        Ok(NodeOutcome::Completed(aggregate(results)))
    }

    fn validate_inputs(
        &self,
        node: &NodeSpec,
        _ctx: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        let config: ForEachConfig = parse_config(node)?;
        match config.mode {
            ForEachMode::SubWorkflow if config.sub_workflow_id.is_none() => Err(
                ProcessorError::validation("sub_workflow mode requires sub_workflow_id"),
            ),
            ForEachMode::ReusableWorkflow if config.workflow_name.is_none() => Err(
                ProcessorError::validation("reusable_workflow mode requires workflow_name"),
            ),
            _ => Ok(()),
        }
    }
}
