//! Execution records, append-only node logs, and the persistence seam.

use crate::node::{NodeId, NodeSpec, NodeType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaycrm_core::{ApprovalId, ExecutionId, ExecutionLogId, UserId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Mutex;

/// Lifecycle of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not yet started.
    Pending,
    /// Traversal in progress.
    Running,
    /// All reachable nodes completed.
    Succeeded,
    /// A node failure aborted the traversal.
    Failed,
    /// Suspended on an approval or external signal.
    Paused,
}

impl ExecutionStatus {
    /// Whether the execution can never progress again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique identifier.
    pub id: ExecutionId,
    /// The workflow this run executes.
    pub workflow_id: WorkflowId,
    /// The payload that started the run.
    pub trigger_data: JsonValue,
    /// Who started the run, if a user did.
    pub triggered_by: Option<UserId>,
    /// Current lifecycle state.
    pub status: ExecutionStatus,
    /// Last persisted context snapshot.
    pub context: JsonValue,
    /// Error that aborted the run, if it failed.
    pub error_message: Option<String>,
    /// When traversal started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl WorkflowExecution {
    /// Creates a pending execution.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        trigger_data: JsonValue,
        triggered_by: Option<UserId>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id,
            trigger_data,
            triggered_by,
            status: ExecutionStatus::Pending,
            context: json!({}),
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Marks the execution running.
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Marks the execution succeeded.
    pub fn succeed(&mut self) {
        self.status = ExecutionStatus::Succeeded;
        self.completed_at = Some(Utc::now());
    }

    /// Marks the execution failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Marks the execution paused.
    pub fn pause(&mut self) {
        self.status = ExecutionStatus::Paused;
    }

    /// Marks a paused execution running again.
    pub fn resume(&mut self) {
        self.status = ExecutionStatus::Running;
    }
}

/// Per-node log status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// The node is executing.
    Running,
    /// The node completed (or suspended cleanly).
    Success,
    /// The node raised an error.
    Failed,
}

/// An append-only record of one node execution.
///
/// A log is created in `Running` state before the processor runs and
/// finalized exactly once; finalized logs are never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    /// Unique identifier.
    pub id: ExecutionLogId,
    /// The execution this log belongs to.
    pub execution_id: ExecutionId,
    /// The node that ran.
    pub node_id: NodeId,
    /// The node's type at execution time.
    pub node_type: NodeType,
    /// The node's display name at execution time.
    pub node_name: String,
    /// Outcome.
    pub status: LogStatus,
    /// Resolved inputs (the replay checkpoint when the processor provides
    /// one, otherwise the raw config).
    pub input_data: JsonValue,
    /// The node's result.
    pub output_data: Option<JsonValue>,
    /// Structured error details on failure.
    pub error_details: Option<JsonValue>,
    /// Wall-clock duration.
    pub duration_ms: Option<u64>,
    /// When the node started.
    pub started_at: DateTime<Utc>,
    /// When the log was finalized.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionLog {
    /// Opens a running log for a node.
    #[must_use]
    pub fn begin(execution_id: ExecutionId, node: &NodeSpec, input_data: JsonValue) -> Self {
        Self {
            id: ExecutionLogId::new(),
            execution_id,
            node_id: node.id.clone(),
            node_type: node.node_type,
            node_name: node.name.clone(),
            status: LogStatus::Running,
            input_data,
            output_data: None,
            error_details: None,
            duration_ms: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Finalizes the log as successful.
    pub fn succeed(&mut self, output: JsonValue, duration_ms: u64) {
        self.status = LogStatus::Success;
        self.output_data = Some(output);
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(Utc::now());
    }

    /// Finalizes the log as failed.
    pub fn fail(&mut self, error_details: JsonValue, duration_ms: u64) {
        self.status = LogStatus::Failed;
        self.error_details = Some(error_details);
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(Utc::now());
    }
}

/// Where a paused execution picks back up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeToken {
    /// The paused execution.
    pub execution_id: ExecutionId,
    /// The node that suspended.
    pub node_id: NodeId,
    /// The approval gating the resume, if an approval node suspended.
    pub approval_id: Option<ApprovalId>,
    /// When the execution suspended.
    pub suspended_at: DateTime<Utc>,
}

/// Persistence failure, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// What the store reported.
    pub message: String,
}

impl StoreError {
    /// Creates a store error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for StoreError {}

/// Persistence seam for executions, logs, and resume tokens.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persists a new execution.
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    /// Persists an updated execution.
    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    /// Fetches an execution by ID.
    async fn execution(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, StoreError>;

    /// Appends a node log.
    async fn append_log(&self, log: &ExecutionLog) -> Result<(), StoreError>;

    /// Finalizes a previously appended log.
    async fn update_log(&self, log: &ExecutionLog) -> Result<(), StoreError>;

    /// All logs for an execution, in append order.
    async fn logs(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionLog>, StoreError>;

    /// Persists a resume token for a paused execution.
    async fn save_resume_token(&self, token: &ResumeToken) -> Result<(), StoreError>;

    /// Removes and returns the resume token, if one exists.
    async fn take_resume_token(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ResumeToken>, StoreError>;
}

/// In-memory `ExecutionStore` used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: Mutex<HashMap<ExecutionId, WorkflowExecution>>,
    logs: Mutex<Vec<ExecutionLog>>,
    tokens: Mutex<HashMap<ExecutionId, ResumeToken>>,
}

impl InMemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        self.executions
            .lock()
            .expect("execution lock poisoned")
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let mut executions = self.executions.lock().expect("execution lock poisoned");
        if !executions.contains_key(&execution.id) {
            return Err(StoreError::new(format!(
                "execution {} does not exist",
                execution.id
            )));
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn execution(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self
            .executions
            .lock()
            .expect("execution lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn append_log(&self, log: &ExecutionLog) -> Result<(), StoreError> {
        self.logs.lock().expect("log lock poisoned").push(log.clone());
        Ok(())
    }

    async fn update_log(&self, log: &ExecutionLog) -> Result<(), StoreError> {
        let mut logs = self.logs.lock().expect("log lock poisoned");
        let Some(stored) = logs.iter_mut().find(|l| l.id == log.id) else {
            return Err(StoreError::new(format!("log {} does not exist", log.id)));
        };
        *stored = log.clone();
        Ok(())
    }

    async fn logs(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionLog>, StoreError> {
        Ok(self
            .logs
            .lock()
            .expect("log lock poisoned")
            .iter()
            .filter(|l| l.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn save_resume_token(&self, token: &ResumeToken) -> Result<(), StoreError> {
        self.tokens
            .lock()
            .expect("token lock poisoned")
            .insert(token.execution_id, token.clone());
        Ok(())
    }

    async fn take_resume_token(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ResumeToken>, StoreError> {
        Ok(self
            .tokens
            .lock()
            .expect("token lock poisoned")
            .remove(&execution_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution() -> WorkflowExecution {
        WorkflowExecution::new(WorkflowId::new(), json!({"k": 1}), None)
    }

    #[test]
    fn lifecycle_transitions_set_timestamps() {
        let mut exec = execution();
        assert_eq!(exec.status, ExecutionStatus::Pending);

        exec.start();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.started_at.is_some());
        assert!(exec.completed_at.is_none());

        exec.succeed();
        assert!(exec.status.is_terminal());
        assert!(exec.completed_at.is_some());
    }

    #[test]
    fn fail_records_the_error() {
        let mut exec = execution();
        exec.start();
        exec.fail("node send: provider exploded");
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(
            exec.error_message.as_deref(),
            Some("node send: provider exploded")
        );
    }

    #[test]
    fn paused_is_not_terminal() {
        let mut exec = execution();
        exec.start();
        exec.pause();
        assert!(!exec.status.is_terminal());
        exec.resume();
        assert_eq!(exec.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn store_round_trips_executions_and_logs() {
        let store = InMemoryExecutionStore::new();
        let mut exec = execution();
        store.create_execution(&exec).await.expect("create");

        exec.start();
        store.update_execution(&exec).await.expect("update");

        let node = NodeSpec::new("n1", NodeType::Trigger, json!({}));
        let mut log = ExecutionLog::begin(exec.id, &node, json!({}));
        store.append_log(&log).await.expect("append");
        log.succeed(json!({"ok": true}), 12);
        store.update_log(&log).await.expect("finalize");

        let fetched = store.execution(exec.id).await.expect("get").expect("some");
        assert_eq!(fetched.status, ExecutionStatus::Running);

        let logs = store.logs(exec.id).await.expect("logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, LogStatus::Success);
        assert_eq!(logs[0].duration_ms, Some(12));
    }

    #[tokio::test]
    async fn updating_unknown_execution_fails() {
        let store = InMemoryExecutionStore::new();
        let result = store.update_execution(&execution()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn resume_token_is_taken_once() {
        let store = InMemoryExecutionStore::new();
        let exec = execution();
        let token = ResumeToken {
            execution_id: exec.id,
            node_id: NodeId::new("approve"),
            approval_id: Some(ApprovalId::new()),
            suspended_at: Utc::now(),
        };
        store.save_resume_token(&token).await.expect("save");

        let taken = store.take_resume_token(exec.id).await.expect("take");
        assert_eq!(taken, Some(token));

        let again = store.take_resume_token(exec.id).await.expect("take again");
        assert!(again.is_none());
    }
}
