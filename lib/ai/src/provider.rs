//! Completion-provider abstraction.
//!
//! The workflow engine treats the AI provider as an opaque collaborator:
//! it hands over a resolved prompt plus model settings and gets back the
//! generated content with usage accounting. Concrete providers (Anthropic,
//! OpenAI, local inference) live outside this crate.

use crate::error::AiError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaycrm_core::TenantId;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A request for a single completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The tenant on whose behalf the call is made (billing + entitlement).
    pub tenant_id: TenantId,
    /// The fully resolved prompt. Never contains unresolved placeholders.
    pub prompt: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// Model identifier (provider-specific).
    pub model: Option<String>,
    /// Sampling temperature (0.0 - 1.0).
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Creates a new request with just a prompt.
    #[must_use]
    pub fn new(tenant_id: TenantId, prompt: impl Into<String>) -> Self {
        Self {
            tenant_id,
            prompt: prompt.into(),
            system: None,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Adds a system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// The result of a completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// The generated content.
    pub content: String,
    /// Model that generated the response.
    pub model: String,
    /// Total tokens consumed (prompt + completion).
    pub tokens_used: u32,
    /// Provider-side processing time in milliseconds.
    pub processing_time_ms: u64,
    /// Billed cost in cents.
    pub cost_cents: u32,
    /// When the completion finished.
    pub completed_at: DateTime<Utc>,
}

/// The completion-provider collaborator contract.
///
/// Implementations must check tenant entitlement before doing any work;
/// `complete` on an unentitled tenant returns `AiError::NotEntitled`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns an error if the tenant may not use AI features.
    async fn check_entitlement(&self, tenant_id: TenantId) -> Result<(), AiError>;

    /// Executes a single completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, AiError>;
}

/// A scripted provider for tests: echoes a canned response or fails.
pub struct MockCompletionProvider {
    /// If set, all calls fail with this error.
    pub fail_with: Option<AiError>,
    /// Content returned on success.
    pub content: String,
    /// Tenants denied by the entitlement check.
    pub denied_tenants: Vec<TenantId>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionProvider {
    /// Creates a provider that always succeeds with the given content.
    #[must_use]
    pub fn succeeding(content: impl Into<String>) -> Self {
        Self {
            fail_with: None,
            content: content.into(),
            denied_tenants: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a provider that always fails with the given error.
    #[must_use]
    pub fn failing(error: AiError) -> Self {
        Self {
            fail_with: Some(error),
            content: String::new(),
            denied_tenants: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Denies entitlement for the given tenant.
    #[must_use]
    pub fn denying(mut self, tenant_id: TenantId) -> Self {
        self.denied_tenants.push(tenant_id);
        self
    }

    /// All completion requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("request lock poisoned").clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn check_entitlement(&self, tenant_id: TenantId) -> Result<(), AiError> {
        if self.denied_tenants.contains(&tenant_id) {
            return Err(AiError::NotEntitled { tenant_id });
        }
        Ok(())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, AiError> {
        self.check_entitlement(request.tenant_id).await?;
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }
        self.requests
            .lock()
            .expect("request lock poisoned")
            .push(request.clone());
        Ok(Completion {
            content: self.content.clone(),
            model: request.model.unwrap_or_else(|| "mock".to_string()),
            tokens_used: 42,
            processing_time_ms: 1,
            cost_cents: 0,
            completed_at: Utc::now(),
        })
    }
}
