//! Error types for the channels crate.

use crate::connection::{ChannelType, RateWindow};
use relaycrm_core::{ConnectionId, UserId};
use std::fmt;

/// Errors from channel connection and messaging operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The user has no active connection for the channel.
    NoActiveConnection {
        user_id: UserId,
        channel: ChannelType,
    },
    /// Connection not found.
    ConnectionNotFound { connection_id: ConnectionId },
    /// The connection's send quota for a window is exhausted.
    RateLimited {
        connection_id: ConnectionId,
        window: RateWindow,
    },
    /// The recipient address is not valid for the channel.
    InvalidRecipient {
        channel: ChannelType,
        recipient: String,
    },
    /// The messaging provider rejected or failed the send.
    Provider { message: String },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveConnection { user_id, channel } => {
                write!(f, "no active {channel} connection for user {user_id}")
            }
            Self::ConnectionNotFound { connection_id } => {
                write!(f, "channel connection not found: {connection_id}")
            }
            Self::RateLimited {
                connection_id,
                window,
            } => {
                write!(f, "send rate limit ({window}) exceeded on {connection_id}")
            }
            Self::InvalidRecipient { channel, recipient } => {
                write!(f, "invalid {channel} recipient: {recipient}")
            }
            Self::Provider { message } => write!(f, "messaging provider error: {message}"),
        }
    }
}

impl std::error::Error for ChannelError {}
