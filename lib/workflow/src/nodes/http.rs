//! Outbound HTTP nodes: generic requests and webhook notifications.
//!
//! Network errors and retryable statuses (429/502/503/504 by default) are
//! retried with exponential backoff. A non-retryable error status is not
//! an error: the node completes with `{success: false, status}` so the
//! workflow can branch on it.

use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use crate::template::{self, TemplateMode};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::time::Duration;

/// Request authentication schemes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthConfig {
    /// `Authorization: Bearer <token>`.
    Bearer {
        /// The token.
        token: String,
    },
    /// HTTP basic auth.
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// An API key in a custom header.
    ApiKey {
        /// Header name.
        header: String,
        /// The key.
        key: String,
    },
    /// An arbitrary header.
    Custom {
        /// Header name.
        header: String,
        /// Header value.
        value: String,
    },
}

/// Retry behavior for outbound requests.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts after the first request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `base * 2^n`.
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,
    /// Statuses worth retrying.
    #[serde(default = "default_retryable")]
    pub retryable_status: Vec<u16>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_retryable() -> Vec<u16> {
    vec![429, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_ms(),
            retryable_status: default_retryable(),
        }
    }
}

impl RetryConfig {
    fn should_retry(&self, status: u16) -> bool {
        self.retryable_status.contains(&status)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1 << attempt.min(16)))
    }
}

#[derive(Debug, Deserialize)]
struct HttpRequestConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<JsonValue>,
    #[serde(default)]
    auth: Option<AuthConfig>,
    #[serde(default)]
    retry: RetryConfig,
    #[serde(default)]
    template_mode: TemplateMode,
}

fn default_method() -> String {
    "GET".to_string()
}

fn parse_method(method: &str) -> Result<reqwest::Method, ProcessorError> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Ok(reqwest::Method::GET),
        "POST" => Ok(reqwest::Method::POST),
        "PUT" => Ok(reqwest::Method::PUT),
        "PATCH" => Ok(reqwest::Method::PATCH),
        "DELETE" => Ok(reqwest::Method::DELETE),
        other => Err(ProcessorError::validation(format!(
            "unsupported HTTP method: {other}"
        ))),
    }
}

async fn execute_with_retries(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    headers: &HashMap<String, String>,
    auth: Option<&AuthConfig>,
    body: Option<&JsonValue>,
    retry: &RetryConfig,
) -> Result<JsonValue, ProcessorError> {
    let mut attempt = 0u32;
    loop {
        let mut request = client.request(method.clone(), url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        request = match auth {
            Some(AuthConfig::Bearer { token }) => request.bearer_auth(token),
            Some(AuthConfig::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(AuthConfig::ApiKey { header, key }) => request.header(header, key),
            Some(AuthConfig::Custom { header, value }) => request.header(header, value),
            None => request,
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if retry.should_retry(status) && attempt < retry.max_retries {
                    tracing::debug!(status, attempt, "retrying after retryable status");
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    attempt += 1;
                    continue;
                }
                let success = (200..300).contains(&status);
                let text = response.text().await.unwrap_or_default();
                let body: JsonValue = serde_json::from_str(&text)
                    .unwrap_or(JsonValue::String(text));
                return Ok(json!({
                    "success": success,
                    "status": status,
                    "body": body,
                    "attempts": attempt + 1,
                }));
            }
            Err(error) => {
                if attempt < retry.max_retries {
                    tracing::debug!(%error, attempt, "retrying after network error");
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Err(ProcessorError::provider(format!(
                    "request to {url} failed after {} attempts: {error}",
                    attempt + 1
                )));
            }
        }
    }
}

/// Processor for [`crate::node::NodeType::HttpRequest`].
pub struct HttpRequestProcessor {
    client: reqwest::Client,
}

impl HttpRequestProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeProcessor for HttpRequestProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: HttpRequestConfig = parse_config(node)?;
        let method = parse_method(&config.method)?;
        let mode = config.template_mode;

        let url = template::resolve(&config.url, ctx, mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let mut headers = HashMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let value = template::resolve(value, ctx, mode)
                .map_err(|e| ProcessorError::validation(e.to_string()))?;
            headers.insert(name.clone(), value);
        }
        let body = match &config.body {
            Some(body) => Some(
                template::resolve_value(body, ctx, mode)
                    .map_err(|e| ProcessorError::validation(e.to_string()))?,
            ),
            None => None,
        };

        let result = execute_with_retries(
            &self.client,
            method,
            &url,
            &headers,
            config.auth.as_ref(),
            body.as_ref(),
            &config.retry,
        )
        .await?;
        Ok(NodeOutcome::Completed(result))
    }

    fn validate_inputs(
        &self,
        node: &NodeSpec,
        _ctx: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        let config: HttpRequestConfig = parse_config(node)?;
        if config.url.trim().is_empty() {
            return Err(ProcessorError::validation("url must not be empty"));
        }
        parse_method(&config.method)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct WebhookOutConfig {
    url: String,
    #[serde(default)]
    event: String,
    /// Defaults to the sanitized context.
    #[serde(default)]
    payload: Option<JsonValue>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    retry: RetryConfig,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for [`crate::node::NodeType::WebhookOut`].
///
/// Always POSTs a JSON envelope `{event, payload, execution_id,
/// timestamp}`. Provider failures here are absorbed by the engine's
/// policy; a dead webhook endpoint never sinks the workflow.
pub struct WebhookOutProcessor {
    client: reqwest::Client,
}

impl WebhookOutProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeProcessor for WebhookOutProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: WebhookOutConfig = parse_config(node)?;
        let url = template::resolve(&config.url, ctx, config.template_mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let payload = match &config.payload {
            Some(payload) => template::resolve_value(payload, ctx, config.template_mode)
                .map_err(|e| ProcessorError::validation(e.to_string()))?,
            None => ctx.sanitized(),
        };
        let envelope = json!({
            "event": config.event,
            "payload": payload,
            "execution_id": ctx.get("execution_id"),
            "timestamp": Utc::now(),
        });

        let result = execute_with_retries(
            &self.client,
            reqwest::Method::POST,
            &url,
            &config.headers,
            None,
            Some(&envelope),
            &config.retry,
        )
        .await?;
        Ok(NodeOutcome::Completed(result))
    }

    fn validate_inputs(
        &self,
        node: &NodeSpec,
        _ctx: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        let config: WebhookOutConfig = parse_config(node)?;
        if config.url.trim().is_empty() {
            return Err(ProcessorError::validation("url must not be empty"));
        }
        Ok(())
    }
}
