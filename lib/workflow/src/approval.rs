//! Human approval requests raised by approval nodes.

use crate::execution::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use relaycrm_core::{ApprovalId, ExecutionId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;

/// State of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a decision.
    Pending,
    /// Approved; the execution may resume down the approved path.
    Approved,
    /// Rejected.
    Rejected,
}

/// An approval request created when an approval node suspends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowApproval {
    /// Unique identifier.
    pub id: ApprovalId,
    /// The paused execution.
    pub execution_id: ExecutionId,
    /// The user asked to decide, if routed to someone specific.
    pub assigned_to: Option<UserId>,
    /// Short title shown in the approval inbox.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Sanitized context snapshot shown to the approver.
    pub approval_data: JsonValue,
    /// Current state.
    pub status: ApprovalStatus,
    /// When the request expires, if a timeout was configured.
    pub timeout_at: Option<DateTime<Utc>>,
    /// Who decided.
    pub responded_by: Option<UserId>,
    /// When the decision was made.
    pub responded_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl WorkflowApproval {
    /// Creates a pending approval.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        title: impl Into<String>,
        description: impl Into<String>,
        approval_data: JsonValue,
    ) -> Self {
        Self {
            id: ApprovalId::new(),
            execution_id,
            assigned_to: None,
            title: title.into(),
            description: description.into(),
            approval_data,
            status: ApprovalStatus::Pending,
            timeout_at: None,
            responded_by: None,
            responded_at: None,
            created_at: Utc::now(),
        }
    }

    /// Routes the request to a specific user.
    #[must_use]
    pub fn assigned_to(mut self, user_id: UserId) -> Self {
        self.assigned_to = Some(user_id);
        self
    }

    /// Sets an expiry relative to creation.
    #[must_use]
    pub fn expires_in_hours(mut self, hours: i64) -> Self {
        self.timeout_at = Some(self.created_at + Duration::hours(hours));
        self
    }

    /// Records an approval decision.
    pub fn approve(&mut self, by: UserId) {
        self.status = ApprovalStatus::Approved;
        self.responded_by = Some(by);
        self.responded_at = Some(Utc::now());
    }

    /// Records a rejection.
    pub fn reject(&mut self, by: UserId) {
        self.status = ApprovalStatus::Rejected;
        self.responded_by = Some(by);
        self.responded_at = Some(Utc::now());
    }
}

/// Persistence seam for approvals.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Persists a new approval request.
    async fn create(&self, approval: &WorkflowApproval) -> Result<(), StoreError>;

    /// Fetches an approval by ID.
    async fn approval(&self, id: ApprovalId) -> Result<Option<WorkflowApproval>, StoreError>;

    /// Persists a decided approval.
    async fn update(&self, approval: &WorkflowApproval) -> Result<(), StoreError>;
}

/// In-memory `ApprovalStore` used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryApprovalStore {
    approvals: Mutex<HashMap<ApprovalId, WorkflowApproval>>,
}

impl InMemoryApprovalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn create(&self, approval: &WorkflowApproval) -> Result<(), StoreError> {
        self.approvals
            .lock()
            .expect("approval lock poisoned")
            .insert(approval.id, approval.clone());
        Ok(())
    }

    async fn approval(&self, id: ApprovalId) -> Result<Option<WorkflowApproval>, StoreError> {
        Ok(self
            .approvals
            .lock()
            .expect("approval lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn update(&self, approval: &WorkflowApproval) -> Result<(), StoreError> {
        let mut approvals = self.approvals.lock().expect("approval lock poisoned");
        if !approvals.contains_key(&approval.id) {
            return Err(StoreError::new(format!(
                "approval {} does not exist",
                approval.id
            )));
        }
        approvals.insert(approval.id, approval.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn approval_starts_pending_with_optional_expiry() {
        let approval = WorkflowApproval::new(
            ExecutionId::new(),
            "Send discount?",
            "20% off for lead",
            json!({"lead_email": "lead@example.com"}),
        )
        .expires_in_hours(48);

        assert_eq!(approval.status, ApprovalStatus::Pending);
        let timeout = approval.timeout_at.expect("timeout");
        assert_eq!(timeout, approval.created_at + Duration::hours(48));
    }

    #[test]
    fn decisions_record_the_responder() {
        let mut approval =
            WorkflowApproval::new(ExecutionId::new(), "t", "d", json!({}));
        let manager = UserId::new();

        approval.approve(manager);
        assert_eq!(approval.status, ApprovalStatus::Approved);
        assert_eq!(approval.responded_by, Some(manager));
        assert!(approval.responded_at.is_some());
    }

    #[tokio::test]
    async fn store_round_trips_decisions() {
        let store = InMemoryApprovalStore::new();
        let mut approval =
            WorkflowApproval::new(ExecutionId::new(), "t", "d", json!({})).assigned_to(UserId::new());
        store.create(&approval).await.expect("create");

        approval.reject(UserId::new());
        store.update(&approval).await.expect("update");

        let fetched = store.approval(approval.id).await.expect("get").expect("some");
        assert_eq!(fetched.status, ApprovalStatus::Rejected);
    }
}
