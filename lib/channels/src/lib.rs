//! Channel connection and messaging contracts for relaycrm.
//!
//! This crate defines the seams the workflow engine's communication nodes
//! depend on:
//!
//! - **Connections**: a user's authenticated link to a channel account,
//!   with per-hour/per-day send quotas reserved atomically
//! - **Providers**: the unified send API fronting email, WhatsApp,
//!   LinkedIn, and SMS

pub mod connection;
pub mod error;
pub mod provider;
pub mod rate_limit;

pub use connection::{
    ChannelConnection, ChannelType, ConnectionStore, RateWindow, SendQuota, SendReservation,
};
pub use error::ChannelError;
pub use provider::{
    Attachment, MessageBody, MessagingProvider, OutboundMessage, RecordingMessagingProvider,
    SendReceipt,
};
pub use rate_limit::InMemoryConnectionStore;
