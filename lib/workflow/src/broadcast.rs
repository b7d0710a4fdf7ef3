//! Execution progress events.
//!
//! The engine emits an event at every lifecycle edge (execution start,
//! node start/complete/fail, pause, resume, terminal states). Broadcasting
//! is strictly fire-and-forget: a failed publish is logged and never
//! affects the traversal.

use crate::node::{NodeId, NodeType};
use chrono::{DateTime, Utc};
use relaycrm_core::{ExecutionId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Mutex;

/// Current event envelope version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Versioned wrapper around a broadcast payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Schema version of the payload.
    pub version: u32,
    /// The payload.
    pub payload: T,
}

impl<T: Serialize> Envelope<T> {
    /// Wraps a payload at the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            payload,
        }
    }

    /// Serializes the envelope for the wire.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Something that happened during an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: NodeType,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    ExecutionPaused {
        execution_id: ExecutionId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    ExecutionResumed {
        execution_id: ExecutionId,
        timestamp: DateTime<Utc>,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        timestamp: DateTime<Utc>,
    },
    ExecutionFailed {
        execution_id: ExecutionId,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// The execution this event belongs to.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeCompleted { execution_id, .. }
            | Self::NodeFailed { execution_id, .. }
            | Self::ExecutionPaused { execution_id, .. }
            | Self::ExecutionResumed { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. }
            | Self::ExecutionFailed { execution_id, .. } => *execution_id,
        }
    }
}

/// Broadcast failure.
#[derive(Debug)]
pub enum BroadcastError {
    /// The transport refused the publish.
    PublishFailed {
        /// What the transport reported.
        message: String,
    },
}

impl fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublishFailed { message } => write!(f, "event publish failed: {message}"),
        }
    }
}

impl Error for BroadcastError {}

/// The broadcast seam.
#[async_trait::async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publishes one event.
    async fn broadcast(&self, event: Envelope<ExecutionEvent>) -> Result<(), BroadcastError>;
}

/// A broadcaster that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBroadcaster;

#[async_trait::async_trait]
impl Broadcaster for NullBroadcaster {
    async fn broadcast(&self, _event: Envelope<ExecutionEvent>) -> Result<(), BroadcastError> {
        Ok(())
    }
}

/// A broadcaster that records events for assertions.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl RecordingBroadcaster {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything broadcast so far.
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().expect("event lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(&self, event: Envelope<ExecutionEvent>) -> Result<(), BroadcastError> {
        self.events
            .lock()
            .expect("event lock poisoned")
            .push(event.payload);
        Ok(())
    }
}
