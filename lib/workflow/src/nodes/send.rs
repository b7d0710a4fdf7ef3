//! Communication send nodes (email, WhatsApp, LinkedIn, SMS).
//!
//! One processor parameterized by channel. The send path is:
//! resolve templates, validate the recipient for the channel, look up the
//! user's active connection, atomically reserve send quota, then hand the
//! message to the provider. Missing connections and exhausted quotas are
//! validation errors (they abort); a provider refusal after a reserved
//! quota surfaces as a provider error, which the engine's policy absorbs
//! into a soft `{success: false}` output.

use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use crate::template::{self, TemplateMode};
use async_trait::async_trait;
use relaycrm_channels::{
    ChannelError, ChannelType, ConnectionStore, MessagingProvider, OutboundMessage,
};
use relaycrm_core::UserId;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct SendConfig {
    /// Whose connection sends the message; falls back to the context's
    /// `user_id` (set by user-triggered runs).
    #[serde(default)]
    user_id: Option<UserId>,
    recipient: String,
    #[serde(default)]
    subject: Option<String>,
    content: String,
    #[serde(default)]
    reply_to: Option<String>,
    #[serde(default)]
    template_mode: TemplateMode,
}

/// Processor for the four send node types.
pub struct SendProcessor {
    channel: ChannelType,
    connections: Arc<dyn ConnectionStore>,
    messaging: Arc<dyn MessagingProvider>,
}

impl SendProcessor {
    /// Creates a send processor for one channel.
    pub fn new(
        channel: ChannelType,
        connections: Arc<dyn ConnectionStore>,
        messaging: Arc<dyn MessagingProvider>,
    ) -> Self {
        Self {
            channel,
            connections,
            messaging,
        }
    }

    fn sender(&self, config: &SendConfig, ctx: &ExecutionContext) -> Result<UserId, ProcessorError> {
        if let Some(user_id) = config.user_id {
            return Ok(user_id);
        }
        ctx.get("user_id")
            .and_then(JsonValue::as_str)
            .and_then(|s| UserId::from_str(s).ok())
            .ok_or_else(|| {
                ProcessorError::validation("send node needs user_id in config or context")
            })
    }

    fn check_recipient(&self, recipient: &str) -> Result<(), ProcessorError> {
        let valid = match self.channel {
            ChannelType::Email => recipient.contains('@') && recipient.contains('.'),
            ChannelType::Whatsapp | ChannelType::Sms => {
                let digits = recipient.strip_prefix('+').unwrap_or(recipient);
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            }
            ChannelType::Linkedin => !recipient.trim().is_empty(),
        };
        if valid {
            Ok(())
        } else {
            Err(ProcessorError::validation(format!(
                "invalid {} recipient: {recipient}",
                self.channel
            )))
        }
    }
}

#[async_trait]
impl NodeProcessor for SendProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: SendConfig = parse_config(node)?;
        let user_id = self.sender(&config, ctx)?;
        let mode = config.template_mode;

        let recipient = template::resolve(&config.recipient, ctx, mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;
        self.check_recipient(&recipient)?;
        let content = template::resolve(&config.content, ctx, mode)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;

        let mut message = OutboundMessage::text(recipient.clone(), content);
        if let Some(subject) = &config.subject {
            let subject = template::resolve(subject, ctx, mode)
                .map_err(|e| ProcessorError::validation(e.to_string()))?;
            message = message.with_subject(subject);
        }
        if let Some(reply_to) = &config.reply_to {
            let reply_to = template::resolve(reply_to, ctx, mode)
                .map_err(|e| ProcessorError::validation(e.to_string()))?;
            message = message.in_reply_to(reply_to);
        }

        let connection = self
            .connections
            .active_connection(user_id, self.channel)
            .await
            .map_err(|e| ProcessorError::provider(e.to_string()))?
            .ok_or_else(|| {
                ProcessorError::validation(format!(
                    "no active {} connection for user {user_id}",
                    self.channel
                ))
            })?;

        let reservation = self
            .connections
            .try_reserve_send(connection.id)
            .await
            .map_err(|e| match e {
                ChannelError::RateLimited { .. } => ProcessorError::validation(e.to_string()),
                other => ProcessorError::provider(other.to_string()),
            })?;

        let receipt = self
            .messaging
            .send_message(&connection, message)
            .await
            .map_err(|e| ProcessorError::provider(e.to_string()))?;

        ctx.insert("last_sent_message_id", json!(receipt.message_id.to_string()));
        ctx.insert("last_sent_external_id", json!(receipt.external_message_id));
        if let Some(conversation_id) = &receipt.conversation_id {
            ctx.insert("last_sent_conversation_id", json!(conversation_id));
        }

        tracing::info!(
            channel = %self.channel,
            message_id = %receipt.message_id,
            "message sent"
        );

        Ok(NodeOutcome::Completed(json!({
            "success": true,
            "channel": self.channel.to_string(),
            "recipient": recipient,
            "message_id": receipt.message_id.to_string(),
            "external_message_id": receipt.external_message_id,
            "conversation_id": receipt.conversation_id,
            "thread_id": receipt.thread_id,
            "remaining_this_hour": reservation.remaining_this_hour,
            "remaining_today": reservation.remaining_today,
        })))
    }

    fn validate_inputs(
        &self,
        node: &NodeSpec,
        _ctx: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        let config: SendConfig = parse_config(node)?;
        if config.recipient.trim().is_empty() {
            return Err(ProcessorError::validation("recipient must not be empty"));
        }
        if config.content.trim().is_empty() {
            return Err(ProcessorError::validation("content must not be empty"));
        }
        Ok(())
    }

    fn create_checkpoint(&self, node: &NodeSpec, ctx: &ExecutionContext) -> Option<JsonValue> {
        let config: SendConfig = parse_config(node).ok()?;
        let recipient = template::resolve(&config.recipient, ctx, config.template_mode).ok()?;
        let content = template::resolve(&config.content, ctx, config.template_mode).ok()?;
        let subject = match &config.subject {
            Some(subject) => {
                Some(template::resolve(subject, ctx, config.template_mode).ok()?)
            }
            None => None,
        };
        Some(json!({
            "channel": self.channel.to_string(),
            "recipient": recipient,
            "subject": subject,
            "content": content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use relaycrm_channels::{
        ChannelConnection, InMemoryConnectionStore, RecordingMessagingProvider,
    };
    use relaycrm_core::{ExecutionId, TenantId, WorkflowId};

    struct Setup {
        processor: SendProcessor,
        provider: Arc<RecordingMessagingProvider>,
        user_id: UserId,
    }

    fn setup(channel: ChannelType, max_per_hour: u32) -> Setup {
        let user_id = UserId::new();
        let connections = Arc::new(InMemoryConnectionStore::new());
        connections.insert(
            ChannelConnection::new(TenantId::new(), user_id, channel, "acct")
                .with_limits(max_per_hour, 100),
        );
        let provider = Arc::new(RecordingMessagingProvider::new());
        Setup {
            processor: SendProcessor::new(channel, connections, provider.clone()),
            provider,
            user_id,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::seed(
            json!({"lead_email": "ada@example.com", "lead_name": "Ada"}),
            "t",
            ExecutionId::new(),
            WorkflowId::new(),
        )
    }

    fn email_node(user_id: UserId) -> NodeSpec {
        NodeSpec::new(
            "send",
            NodeType::EmailSend,
            json!({
                "user_id": user_id,
                "recipient": "{lead_email}",
                "subject": "Hi {lead_name}",
                "content": "Hello {lead_name}!"
            }),
        )
    }

    #[tokio::test]
    async fn sends_resolved_message_and_updates_context() {
        let s = setup(ChannelType::Email, 10);
        let mut ctx = ctx();

        let NodeOutcome::Completed(result) = s
            .processor
            .process(&email_node(s.user_id), &mut ctx)
            .await
            .expect("process")
        else {
            panic!("expected completion");
        };

        assert_eq!(result["success"], json!(true));
        assert_eq!(result["recipient"], json!("ada@example.com"));
        assert_eq!(result["remaining_this_hour"], json!(9));

        let sent = s.provider.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "Hello Ada!");
        assert_eq!(sent[0].subject.as_deref(), Some("Hi Ada"));

        assert!(ctx.get("last_sent_message_id").is_some());
        assert!(ctx.get("last_sent_conversation_id").is_some());
    }

    #[tokio::test]
    async fn invalid_email_recipient_fails_validation() {
        let s = setup(ChannelType::Email, 10);
        let node = NodeSpec::new(
            "send",
            NodeType::EmailSend,
            json!({"user_id": s.user_id, "recipient": "not-an-email", "content": "hi"}),
        );

        let result = s.processor.process(&node, &mut ctx()).await;
        assert!(matches!(result, Err(ProcessorError::Validation { .. })));
        assert!(s.provider.sent().is_empty());
    }

    #[tokio::test]
    async fn sms_recipient_must_be_a_phone_number() {
        let s = setup(ChannelType::Sms, 10);
        let node = NodeSpec::new(
            "send",
            NodeType::SmsSend,
            json!({"user_id": s.user_id, "recipient": "+15550001111", "content": "hi"}),
        );
        s.processor.process(&node, &mut ctx()).await.expect("valid number");

        let node = NodeSpec::new(
            "send",
            NodeType::SmsSend,
            json!({"user_id": s.user_id, "recipient": "call-me", "content": "hi"}),
        );
        let result = s.processor.process(&node, &mut ctx()).await;
        assert!(matches!(result, Err(ProcessorError::Validation { .. })));
    }

    #[tokio::test]
    async fn missing_connection_is_a_validation_error() {
        let s = setup(ChannelType::Email, 10);
        // A user with no connection at all.
        let node = email_node(UserId::new());

        let result = s.processor.process(&node, &mut ctx()).await;
        let Err(ProcessorError::Validation { message }) = result else {
            panic!("expected validation error");
        };
        assert!(message.contains("no active email connection"));
    }

    #[tokio::test]
    async fn exhausted_quota_is_a_validation_error() {
        let s = setup(ChannelType::Email, 1);
        s.processor
            .process(&email_node(s.user_id), &mut ctx())
            .await
            .expect("first send");

        let result = s.processor.process(&email_node(s.user_id), &mut ctx()).await;
        assert!(matches!(result, Err(ProcessorError::Validation { .. })));
        assert_eq!(s.provider.sent().len(), 1);
    }

    #[tokio::test]
    async fn provider_refusal_is_a_provider_error() {
        let user_id = UserId::new();
        let connections = Arc::new(InMemoryConnectionStore::new());
        connections.insert(ChannelConnection::new(
            TenantId::new(),
            user_id,
            ChannelType::Email,
            "acct",
        ));
        let provider = Arc::new(RecordingMessagingProvider::failing(ChannelError::Provider {
            message: "smtp 451".to_string(),
        }));
        let processor = SendProcessor::new(ChannelType::Email, connections, provider);

        let result = processor.process(&email_node(user_id), &mut ctx()).await;
        assert!(matches!(result, Err(ProcessorError::Provider { .. })));
    }

    #[tokio::test]
    async fn empty_content_fails_preflight() {
        let s = setup(ChannelType::Email, 10);
        let node = NodeSpec::new(
            "send",
            NodeType::EmailSend,
            json!({"user_id": s.user_id, "recipient": "a@b.c", "content": ""}),
        );
        let result = s.processor.validate_inputs(&node, &ctx());
        assert!(matches!(result, Err(ProcessorError::Validation { .. })));
    }

    #[test]
    fn checkpoint_holds_resolved_fields() {
        let s = setup(ChannelType::Email, 10);
        let checkpoint = s
            .processor
            .create_checkpoint(&email_node(s.user_id), &ctx())
            .expect("checkpoint");
        assert_eq!(checkpoint["recipient"], json!("ada@example.com"));
        assert_eq!(checkpoint["content"], json!("Hello Ada!"));
    }
}
