//! In-memory connection store with atomic send-quota accounting.
//!
//! Both rate windows (hour and day) are checked and incremented under a
//! single lock, so concurrent sends on the same connection cannot both
//! pass a limit check before either counter moves.

use crate::connection::{
    ChannelConnection, ChannelType, ConnectionStore, RateWindow, SendQuota, SendReservation,
};
use crate::error::ChannelError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use relaycrm_core::{ConnectionId, UserId};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

/// State for a single rolling window.
#[derive(Debug, Clone)]
struct WindowState {
    count: u32,
    window_start: DateTime<Utc>,
}

impl WindowState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Resets the window if it has elapsed.
    fn roll(&mut self, now: DateTime<Utc>, duration: Duration) {
        if now - self.window_start >= duration {
            self.window_start = now;
            self.count = 0;
        }
    }
}

/// Per-connection send counters.
#[derive(Debug, Clone)]
struct SendWindows {
    hour: WindowState,
    day: WindowState,
}

impl SendWindows {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            hour: WindowState::new(now),
            day: WindowState::new(now),
        }
    }
}

/// An in-memory `ConnectionStore`.
///
/// Used by tests and single-process deployments; production deployments
/// back the same trait with the tenant database.
#[derive(Debug, Default)]
pub struct InMemoryConnectionStore {
    connections: RwLock<HashMap<ConnectionId, ChannelConnection>>,
    windows: Mutex<HashMap<ConnectionId, SendWindows>>,
}

impl InMemoryConnectionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to the store.
    pub fn insert(&self, connection: ChannelConnection) {
        self.connections
            .write()
            .expect("connection store lock poisoned")
            .insert(connection.id, connection);
    }

    fn connection(&self, connection_id: ConnectionId) -> Result<ChannelConnection, ChannelError> {
        self.connections
            .read()
            .expect("connection store lock poisoned")
            .get(&connection_id)
            .cloned()
            .ok_or(ChannelError::ConnectionNotFound { connection_id })
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn active_connection(
        &self,
        user_id: UserId,
        channel: ChannelType,
    ) -> Result<Option<ChannelConnection>, ChannelError> {
        let connections = self
            .connections
            .read()
            .expect("connection store lock poisoned");
        Ok(connections
            .values()
            .find(|c| c.user_id == user_id && c.channel_type == channel && c.active)
            .cloned())
    }

    async fn try_reserve_send(
        &self,
        connection_id: ConnectionId,
    ) -> Result<SendReservation, ChannelError> {
        let connection = self.connection(connection_id)?;
        let now = Utc::now();

        let mut windows = self.windows.lock().expect("send window lock poisoned");
        let state = windows
            .entry(connection_id)
            .or_insert_with(|| SendWindows::new(now));

        state.hour.roll(now, Duration::hours(1));
        state.day.roll(now, Duration::days(1));

        if state.hour.count >= connection.max_per_hour {
            return Err(ChannelError::RateLimited {
                connection_id,
                window: RateWindow::Hour,
            });
        }
        if state.day.count >= connection.max_per_day {
            return Err(ChannelError::RateLimited {
                connection_id,
                window: RateWindow::Day,
            });
        }

        state.hour.count += 1;
        state.day.count += 1;

        Ok(SendReservation {
            connection_id,
            remaining_this_hour: connection.max_per_hour - state.hour.count,
            remaining_today: connection.max_per_day - state.day.count,
            reserved_at: now,
        })
    }

    async fn quota(&self, connection_id: ConnectionId) -> Result<SendQuota, ChannelError> {
        self.connection(connection_id)?;
        let windows = self.windows.lock().expect("send window lock poisoned");
        let quota = windows
            .get(&connection_id)
            .map_or(SendQuota { sent_this_hour: 0, sent_today: 0 }, |w| SendQuota {
                sent_this_hour: w.hour.count,
                sent_today: w.day.count,
            });
        Ok(quota)
    }
}
