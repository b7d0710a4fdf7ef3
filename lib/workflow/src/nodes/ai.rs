//! AI nodes: prompt completion and analysis.
//!
//! Both nodes check tenant entitlement before spending tokens and report
//! usage metadata (`model`, `tokens_used`, `processing_time_ms`,
//! `cost_cents`) alongside the completion text.

use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use crate::template::{self, TemplateMode};
use async_trait::async_trait;
use relaycrm_ai::{AiError, Completion, CompletionProvider, CompletionRequest};
use relaycrm_core::TenantId;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

fn map_ai_error(error: AiError) -> ProcessorError {
    match error {
        AiError::NotEntitled { tenant_id } => {
            ProcessorError::validation(format!("tenant {tenant_id} has no AI entitlement"))
        }
        AiError::InvalidConfig { reason } => ProcessorError::config(reason),
        AiError::Timeout => ProcessorError::timeout("completion request timed out"),
        other => ProcessorError::provider(other.to_string()),
    }
}

fn completion_result(completion: &Completion, extra: JsonValue) -> JsonValue {
    let mut result = json!({
        "success": true,
        "output": completion.content,
        "ai_metadata": {
            "model": completion.model,
            "tokens_used": completion.tokens_used,
            "processing_time_ms": completion.processing_time_ms,
            "cost_cents": completion.cost_cents,
        },
    });
    if let (Some(result_map), JsonValue::Object(extra_map)) = (result.as_object_mut(), extra) {
        for (key, value) in extra_map {
            result_map.insert(key, value);
        }
    }
    result
}

#[derive(Debug, Deserialize)]
struct AiPromptConfig {
    prompt: String,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for [`crate::node::NodeType::AiPrompt`].
pub struct AiPromptProcessor {
    provider: Arc<dyn CompletionProvider>,
    tenant_id: TenantId,
}

impl AiPromptProcessor {
    /// Creates the processor.
    pub fn new(provider: Arc<dyn CompletionProvider>, tenant_id: TenantId) -> Self {
        Self {
            provider,
            tenant_id,
        }
    }
}

#[async_trait]
impl NodeProcessor for AiPromptProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: AiPromptConfig = parse_config(node)?;
        let prompt = template::resolve(&config.prompt, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;

        self.provider
            .check_entitlement(self.tenant_id)
            .await
            .map_err(map_ai_error)?;

        let mut request = CompletionRequest::new(self.tenant_id, prompt);
        if let Some(system) = config.system {
            let system = template::resolve(&system, ctx, config.template_mode)
                .map_err(|e| ProcessorError::validation(e.to_string()))?;
            request = request.with_system(system);
        }
        if let Some(model) = config.model {
            request = request.with_model(model);
        }
        if let Some(temperature) = config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let completion = self.provider.complete(request).await.map_err(map_ai_error)?;
        Ok(NodeOutcome::Completed(completion_result(
            &completion,
            json!({}),
        )))
    }

    fn validate_inputs(
        &self,
        node: &NodeSpec,
        _ctx: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        let config: AiPromptConfig = parse_config(node)?;
        if config.prompt.trim().is_empty() {
            return Err(ProcessorError::validation("prompt must not be empty"));
        }
        Ok(())
    }

    fn create_checkpoint(&self, node: &NodeSpec, ctx: &ExecutionContext) -> Option<JsonValue> {
        let config: AiPromptConfig = parse_config(node).ok()?;
        let prompt = template::resolve(&config.prompt, ctx, config.template_mode).ok()?;
        Some(json!({
            "prompt": prompt,
            "model": config.model,
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        }))
    }
}

/// Built-in analysis kinds; anything else is passed through verbatim as
/// the analysis instruction.
#[derive(Debug, Deserialize)]
struct AiAnalysisConfig {
    analysis_type: String,
    data_path: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

/// Processor for [`crate::node::NodeType::AiAnalysis`].
pub struct AiAnalysisProcessor {
    provider: Arc<dyn CompletionProvider>,
    tenant_id: TenantId,
}

impl AiAnalysisProcessor {
    /// Creates the processor.
    pub fn new(provider: Arc<dyn CompletionProvider>, tenant_id: TenantId) -> Self {
        Self {
            provider,
            tenant_id,
        }
    }

    fn instruction(analysis_type: &str) -> String {
        match analysis_type {
            "sentiment" => "Classify the sentiment of the following data as positive, neutral, or negative, and explain briefly.".to_string(),
            "summary" => "Summarize the following data in two or three sentences.".to_string(),
            "classification" => "Classify the following data into the most fitting category and justify the choice.".to_string(),
            other => format!("Perform a {other} analysis of the following data."),
        }
    }
}

#[async_trait]
impl NodeProcessor for AiAnalysisProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: AiAnalysisConfig = parse_config(node)?;
        let data = ctx.lookup_path(&config.data_path).ok_or_else(|| {
            ProcessorError::validation(format!(
                "data_path does not resolve: {}",
                config.data_path
            ))
        })?;
        let prompt = format!("{}\n\n{}", Self::instruction(&config.analysis_type), data);

        self.provider
            .check_entitlement(self.tenant_id)
            .await
            .map_err(map_ai_error)?;

        let mut request = CompletionRequest::new(self.tenant_id, prompt);
        if let Some(model) = config.model {
            request = request.with_model(model);
        }
        if let Some(max_tokens) = config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let completion = self.provider.complete(request).await.map_err(map_ai_error)?;
        Ok(NodeOutcome::Completed(completion_result(
            &completion,
            json!({"analysis_type": config.analysis_type}),
        )))
    }

    fn validate_inputs(
        &self,
        node: &NodeSpec,
        ctx: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        let config: AiAnalysisConfig = parse_config(node)?;
        if ctx.lookup_path(&config.data_path).is_none() {
            return Err(ProcessorError::validation(format!(
                "data_path does not resolve: {}",
                config.data_path
            )));
        }
        Ok(())
    }
}
