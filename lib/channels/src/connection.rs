//! Channel connections and the connection-store contract.
//!
//! A channel connection is a user's authenticated link to a communication
//! provider account (an email inbox, a WhatsApp number, a LinkedIn profile).
//! The workflow engine's send nodes resolve the active connection for a
//! user/channel pair and reserve send quota on it before delegating to the
//! messaging provider.

use crate::error::ChannelError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaycrm_core::{ConnectionId, TenantId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The communication channel a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// Email (IMAP/SMTP or provider-unified).
    Email,
    /// WhatsApp messaging.
    Whatsapp,
    /// LinkedIn messaging.
    Linkedin,
    /// SMS.
    Sms,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
            Self::Linkedin => "linkedin",
            Self::Sms => "sms",
        };
        f.write_str(name)
    }
}

/// The rate window a quota applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
    /// Rolling one-hour window.
    Hour,
    /// Rolling one-day window.
    Day,
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hour => f.write_str("hour"),
            Self::Day => f.write_str("day"),
        }
    }
}

/// A user's authenticated link to a communication provider account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConnection {
    /// Unique identifier for this connection.
    pub id: ConnectionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Owning user.
    pub user_id: UserId,
    /// The channel this connection serves.
    pub channel_type: ChannelType,
    /// Provider-side account identifier (address, phone number, profile id).
    pub account_identifier: String,
    /// Whether the connection is currently usable.
    pub active: bool,
    /// Maximum messages per hour.
    pub max_per_hour: u32,
    /// Maximum messages per day.
    pub max_per_day: u32,
}

impl ChannelConnection {
    /// Creates a new active connection with default send limits.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        channel_type: ChannelType,
        account_identifier: impl Into<String>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            tenant_id,
            user_id,
            channel_type,
            account_identifier: account_identifier.into(),
            active: true,
            max_per_hour: 30,
            max_per_day: 200,
        }
    }

    /// Overrides the send limits.
    #[must_use]
    pub fn with_limits(mut self, max_per_hour: u32, max_per_day: u32) -> Self {
        self.max_per_hour = max_per_hour;
        self.max_per_day = max_per_day;
        self
    }
}

/// Snapshot of a connection's send counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendQuota {
    /// Messages sent in the current hour window.
    pub sent_this_hour: u32,
    /// Messages sent in the current day window.
    pub sent_today: u32,
}

/// Proof that one send slot was reserved on a connection.
///
/// Reservation is atomic check-and-increment: two concurrent reservations
/// can never both pass a limit check before either counter moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReservation {
    /// The connection the slot was reserved on.
    pub connection_id: ConnectionId,
    /// Remaining sends in the hour window after this reservation.
    pub remaining_this_hour: u32,
    /// Remaining sends in the day window after this reservation.
    pub remaining_today: u32,
    /// When the reservation was made.
    pub reserved_at: DateTime<Utc>,
}

/// The channel-connection store collaborator contract.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Returns the user's active connection for a channel, if any.
    async fn active_connection(
        &self,
        user_id: UserId,
        channel: ChannelType,
    ) -> Result<Option<ChannelConnection>, ChannelError>;

    /// Atomically reserves one send slot on the connection.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::RateLimited` naming the exhausted window, or
    /// `ChannelError::ConnectionNotFound` for an unknown connection.
    async fn try_reserve_send(
        &self,
        connection_id: ConnectionId,
    ) -> Result<SendReservation, ChannelError>;

    /// Returns the connection's current send counters.
    async fn quota(&self, connection_id: ConnectionId) -> Result<SendQuota, ChannelError>;
}
