//! Sub-workflow nodes and the runner seam.
//!
//! A sub-workflow runs as its own execution with its own logs; the parent
//! node waits for it and records its outcome. The runner trait breaks the
//! processor-engine cycle so for-each fan-out can share it.

use crate::context::ExecutionContext;
use crate::definition::WorkflowRepo;
use crate::engine::WorkflowEngine;
use crate::execution::{ExecutionStatus, ExecutionStore};
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use crate::broadcast::Broadcaster;
use crate::template::{self, TemplateMode};
use async_trait::async_trait;
use relaycrm_core::WorkflowId;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Sub-workflow invocation failure.
#[derive(Debug, Clone)]
pub enum SubWorkflowError {
    /// No workflow with the given ID.
    WorkflowNotFound {
        /// The missing ID.
        workflow_id: WorkflowId,
    },
    /// No reusable workflow registered under the name.
    ReusableNotFound {
        /// The missing name.
        name: String,
    },
    /// The sub-execution failed or could not run.
    Failed {
        /// Why.
        message: String,
    },
}

impl fmt::Display for SubWorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowNotFound { workflow_id } => {
                write!(f, "sub-workflow not found: {workflow_id}")
            }
            Self::ReusableNotFound { name } => {
                write!(f, "reusable workflow not found: {name}")
            }
            Self::Failed { message } => write!(f, "sub-workflow failed: {message}"),
        }
    }
}

impl Error for SubWorkflowError {}

/// Runs child workflows to completion.
#[async_trait]
pub trait SubWorkflowRunner: Send + Sync {
    /// Runs a workflow by ID with the given seed payload.
    async fn run(
        &self,
        workflow_id: WorkflowId,
        seed: JsonValue,
    ) -> Result<JsonValue, SubWorkflowError>;

    /// Runs a reusable workflow by name.
    async fn run_reusable(&self, name: &str, seed: JsonValue)
        -> Result<JsonValue, SubWorkflowError>;
}

/// The production runner: drives child executions through the engine.
pub struct EngineRunner<S, B> {
    engine: Arc<WorkflowEngine<S, B>>,
    repo: Arc<dyn WorkflowRepo>,
}

impl<S, B> EngineRunner<S, B> {
    /// Creates a runner.
    pub fn new(engine: Arc<WorkflowEngine<S, B>>, repo: Arc<dyn WorkflowRepo>) -> Self {
        Self { engine, repo }
    }
}

impl<S: ExecutionStore, B: Broadcaster> EngineRunner<S, B> {
    async fn execute(
        &self,
        workflow: &crate::definition::Workflow,
        seed: JsonValue,
    ) -> Result<JsonValue, SubWorkflowError> {
        let execution = self
            .engine
            .execute_workflow(workflow, seed, None)
            .await
            .map_err(|e| SubWorkflowError::Failed {
                message: e.to_string(),
            })?;

        match execution.status {
            ExecutionStatus::Succeeded => Ok(json!({
                "execution_id": execution.id.to_string(),
                "status": "succeeded",
                "output": execution.context,
            })),
            status => Err(SubWorkflowError::Failed {
                message: format!(
                    "execution {} ended {:?}: {}",
                    execution.id,
                    status,
                    execution.error_message.unwrap_or_default()
                ),
            }),
        }
    }
}

#[async_trait]
impl<S: ExecutionStore, B: Broadcaster> SubWorkflowRunner for EngineRunner<S, B> {
    async fn run(
        &self,
        workflow_id: WorkflowId,
        seed: JsonValue,
    ) -> Result<JsonValue, SubWorkflowError> {
        let workflow = self
            .repo
            .workflow(workflow_id)
            .await
            .ok_or(SubWorkflowError::WorkflowNotFound { workflow_id })?;
        self.execute(&workflow, seed).await
    }

    async fn run_reusable(
        &self,
        name: &str,
        seed: JsonValue,
    ) -> Result<JsonValue, SubWorkflowError> {
        let workflow =
            self.repo
                .reusable(name)
                .await
                .ok_or_else(|| SubWorkflowError::ReusableNotFound {
                    name: name.to_string(),
                })?;
        self.execute(&workflow, seed).await
    }
}

fn map_sub_error(error: SubWorkflowError) -> ProcessorError {
    match &error {
        SubWorkflowError::WorkflowNotFound { .. } | SubWorkflowError::ReusableNotFound { .. } => {
            ProcessorError::validation(error.to_string())
        }
        SubWorkflowError::Failed { .. } => ProcessorError::provider(error.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct SubWorkflowConfig {
    workflow_id: WorkflowId,
    /// Templated seed payload for the child execution.
    #[serde(default)]
    input: JsonValue,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for [`crate::node::NodeType::SubWorkflow`].
pub struct SubWorkflowProcessor {
    runner: Arc<dyn SubWorkflowRunner>,
}

impl SubWorkflowProcessor {
    /// Creates the processor.
    pub fn new(runner: Arc<dyn SubWorkflowRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl NodeProcessor for SubWorkflowProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: SubWorkflowConfig = parse_config(node)?;
        let seed = template::resolve_value(&config.input, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let result = self
            .runner
            .run(config.workflow_id, seed)
            .await
            .map_err(map_sub_error)?;

        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "sub_execution": result,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct ReusableWorkflowConfig {
    workflow_name: String,
    #[serde(default)]
    input: JsonValue,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for [`crate::node::NodeType::ReusableWorkflow`].
pub struct ReusableWorkflowProcessor {
    runner: Arc<dyn SubWorkflowRunner>,
}

impl ReusableWorkflowProcessor {
    /// Creates the processor.
    pub fn new(runner: Arc<dyn SubWorkflowRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl NodeProcessor for ReusableWorkflowProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: ReusableWorkflowConfig = parse_config(node)?;
        let seed = template::resolve_value(&config.input, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let result = self
            .runner
            .run_reusable(&config.workflow_name, seed)
            .await
            .map_err(map_sub_error)?;

        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "workflow_name": config.workflow_name,
            "sub_execution": result,
        })))
    }
}
