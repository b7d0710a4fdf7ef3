//! NATS-backed execution event broadcasting.
//!
//! Events are published to subjects like `workflow.execution.<id>` so UI
//! subscribers can follow one execution without filtering. Publishing is
//! plain core NATS; the engine treats events as best-effort and callers
//! never retry.

use crate::broadcast::{BroadcastError, Broadcaster, Envelope, ExecutionEvent};
use async_trait::async_trait;
use relaycrm_core::ExecutionId;

/// Default subject prefix for execution events.
const EXECUTION_EVENTS_SUBJECT_PREFIX: &str = "workflow.execution";

/// Configuration for the NATS broadcaster.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URL.
    pub url: String,
    /// Subject prefix (defaults to `workflow.execution`).
    pub subject_prefix: Option<String>,
}

impl NatsConfig {
    /// Creates a config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: None,
        }
    }

    fn prefix(&self) -> &str {
        self.subject_prefix
            .as_deref()
            .unwrap_or(EXECUTION_EVENTS_SUBJECT_PREFIX)
    }
}

/// Publishes execution events to NATS.
pub struct NatsBroadcaster {
    client: async_nats::Client,
    config: NatsConfig,
}

impl NatsBroadcaster {
    /// Connects to NATS.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(config: NatsConfig) -> Result<Self, BroadcastError> {
        let client =
            async_nats::connect(&config.url)
                .await
                .map_err(|e| BroadcastError::PublishFailed {
                    message: format!("failed to connect: {e}"),
                })?;
        Ok(Self { client, config })
    }

    fn subject(&self, execution_id: ExecutionId) -> String {
        format!("{}.{execution_id}", self.config.prefix())
    }
}

#[async_trait]
impl Broadcaster for NatsBroadcaster {
    async fn broadcast(&self, event: Envelope<ExecutionEvent>) -> Result<(), BroadcastError> {
        let subject = self.subject(event.payload.execution_id());
        let bytes = event
            .to_json_bytes()
            .map_err(|e| BroadcastError::PublishFailed {
                message: format!("failed to serialize event: {e}"),
            })?;

        self.client
            .publish(subject, bytes.into())
            .await
            .map_err(|e| BroadcastError::PublishFailed {
                message: e.to_string(),
            })?;

        Ok(())
    }
}
