//! Messaging-provider abstraction.
//!
//! All outbound sends go through one unification provider that fronts the
//! concrete channel APIs. The workflow engine only depends on this narrow
//! contract; retries are at the caller's discretion and sends must be safe
//! to retry with the same content.

use crate::connection::ChannelConnection;
use crate::error::ChannelError;
use async_trait::async_trait;
use relaycrm_core::MessageId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Mutex;

/// The content type of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageBody {
    /// Plain text.
    #[default]
    Text,
    /// HTML (email only).
    Html,
}

/// An attachment reference on an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name.
    pub name: String,
    /// Where the provider fetches the content from.
    pub url: String,
}

/// A message to send on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Channel-specific recipient address.
    pub recipient: String,
    /// Subject line (email only).
    pub subject: Option<String>,
    /// The message content.
    pub content: String,
    /// Content type.
    pub body: MessageBody,
    /// Attachments, if any.
    pub attachments: Vec<Attachment>,
    /// Provider message id this send replies to, if threading.
    pub reply_to: Option<String>,
    /// Provider-specific extras passed through untouched.
    pub extra: Option<JsonValue>,
}

impl OutboundMessage {
    /// Creates a plain-text message.
    #[must_use]
    pub fn text(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            subject: None,
            content: content.into(),
            body: MessageBody::Text,
            attachments: Vec::new(),
            reply_to: None,
            extra: None,
        }
    }

    /// Sets the subject line.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Threads this message as a reply.
    #[must_use]
    pub fn in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }
}

/// What the provider reports back after a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Our identifier for the sent message.
    pub message_id: MessageId,
    /// The provider's identifier for the message.
    pub external_message_id: String,
    /// The conversation the message landed in, if the channel threads.
    pub conversation_id: Option<String>,
    /// The thread/chat identifier, if distinct from the conversation.
    pub thread_id: Option<String>,
}

/// The messaging-provider collaborator contract.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Sends a message through the given connection.
    async fn send_message(
        &self,
        connection: &ChannelConnection,
        message: OutboundMessage,
    ) -> Result<SendReceipt, ChannelError>;
}

/// A provider double that records sends and can be scripted to fail.
#[derive(Default)]
pub struct RecordingMessagingProvider {
    /// If set, all sends fail with this error.
    pub fail_with: Mutex<Option<ChannelError>>,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingMessagingProvider {
    /// Creates a provider where every send succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider where every send fails.
    #[must_use]
    pub fn failing(error: ChannelError) -> Self {
        Self {
            fail_with: Mutex::new(Some(error)),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Returns all messages sent so far.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }
}

#[async_trait]
impl MessagingProvider for RecordingMessagingProvider {
    async fn send_message(
        &self,
        _connection: &ChannelConnection,
        message: OutboundMessage,
    ) -> Result<SendReceipt, ChannelError> {
        if let Some(e) = self.fail_with.lock().expect("fail lock poisoned").clone() {
            return Err(e);
        }
        let message_id = MessageId::new();
        let external = format!("ext_{message_id}");
        self.sent.lock().expect("sent lock poisoned").push(message);
        Ok(SendReceipt {
            message_id,
            external_message_id: external,
            conversation_id: Some(format!("conv_{message_id}")),
            thread_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelType;
    use relaycrm_core::{TenantId, UserId};

    fn connection() -> ChannelConnection {
        ChannelConnection::new(
            TenantId::new(),
            UserId::new(),
            ChannelType::Email,
            "rep@example.com",
        )
    }

    #[tokio::test]
    async fn recording_provider_captures_messages() {
        let provider = RecordingMessagingProvider::new();
        let message = OutboundMessage::text("lead@example.com", "Hello").with_subject("Intro");

        let receipt = provider
            .send_message(&connection(), message.clone())
            .await
            .expect("send");

        assert!(!receipt.external_message_id.is_empty());
        assert_eq!(provider.sent(), vec![message]);
    }

    #[tokio::test]
    async fn failing_provider_returns_error_and_records_nothing() {
        let provider = RecordingMessagingProvider::failing(ChannelError::Provider {
            message: "upstream 502".to_string(),
        });

        let result = provider
            .send_message(&connection(), OutboundMessage::text("a@b.c", "hi"))
            .await;

        assert!(matches!(result, Err(ChannelError::Provider { .. })));
        assert!(provider.sent().is_empty());
    }
}
