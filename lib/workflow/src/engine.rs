//! The workflow execution engine.
//!
//! Traversal model: a FIFO queue seeded with the entry nodes (or an
//! explicit start node). A dequeued node whose dependencies have not all
//! executed is requeued at the back; completed nodes enqueue their
//! dependents. Graph validation up front guarantees the queue drains on a
//! connected DAG.
//!
//! Failure policy: validation, config, and timeout errors abort the
//! execution. Provider errors consult the node type's policy; sends and
//! outbound webhooks absorb them as soft `{success: false}` outputs.
//! `continue_on_error` on a node absorbs any failure. Absorbed failures
//! still produce a failed node log, and downstream nodes still run.
//!
//! Pause model: a processor may suspend the execution (approval gates). A
//! resume token records where to pick up; `resume_execution` restores the
//! persisted context, applies the resume payload as the suspended node's
//! output, and continues with its dependents.

use crate::broadcast::{Broadcaster, Envelope, ExecutionEvent};
use crate::context::ExecutionContext;
use crate::definition::Workflow;
use crate::error::{EngineError, GraphError};
use crate::execution::{
    ExecutionLog, ExecutionStore, ResumeToken, WorkflowExecution,
};
use crate::graph::ExecutionGraph;
use crate::node::{NodeId, NodeSpec};
use crate::processor::{NodeOutcome, ProcessorError, ProcessorRegistry, SuspendReason};
use chrono::Utc;
use relaycrm_core::UserId;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The tenant schema stamped into every execution context.
    pub tenant_schema: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tenant_schema: "public".to_string(),
        }
    }
}

/// Executes workflows against a processor registry.
pub struct WorkflowEngine<S, B> {
    registry: ProcessorRegistry,
    store: Arc<S>,
    broadcaster: Arc<B>,
    config: EngineConfig,
}

/// Per-node result inside the traversal: distinguishes a node-level
/// failure (subject to the failure policy) from engine-level trouble.
enum NodeRun {
    Outcome(NodeOutcome),
    Failed(ProcessorError),
}

impl<S: ExecutionStore, B: Broadcaster> WorkflowEngine<S, B> {
    /// Creates an engine.
    pub fn new(
        registry: ProcessorRegistry,
        store: Arc<S>,
        broadcaster: Arc<B>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            broadcaster,
            config,
        }
    }

    /// Runs a workflow from its entry nodes.
    pub async fn execute_workflow(
        &self,
        workflow: &Workflow,
        trigger_data: JsonValue,
        triggered_by: Option<UserId>,
    ) -> Result<WorkflowExecution, EngineError> {
        self.execute_from(workflow, trigger_data, triggered_by, None)
            .await
    }

    /// Runs a workflow from a specific start node.
    ///
    /// Node failures do not surface as `Err`; the returned execution's
    /// status and `error_message` carry them. `Err` means the engine could
    /// not run the workflow at all.
    pub async fn execute_from(
        &self,
        workflow: &Workflow,
        trigger_data: JsonValue,
        triggered_by: Option<UserId>,
        start_node: Option<&NodeId>,
    ) -> Result<WorkflowExecution, EngineError> {
        let graph = ExecutionGraph::build(&workflow.nodes, &workflow.edges)?;
        let seeds = match start_node {
            Some(id) => {
                if !graph.contains(id) {
                    return Err(GraphError::UnknownStartNode {
                        node_id: id.clone(),
                    }
                    .into());
                }
                vec![id.clone()]
            }
            None => graph.entry_nodes(),
        };

        let mut execution = WorkflowExecution::new(workflow.id, trigger_data.clone(), triggered_by);
        let mut ctx = ExecutionContext::seed(
            trigger_data,
            &self.config.tenant_schema,
            execution.id,
            workflow.id,
        );

        self.store.create_execution(&execution).await?;
        execution.start();
        self.store.update_execution(&execution).await?;
        self.emit(ExecutionEvent::ExecutionStarted {
            execution_id: execution.id,
            workflow_id: workflow.id,
            timestamp: Utc::now(),
        })
        .await;

        tracing::info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            nodes = graph.len(),
            "starting workflow execution"
        );

        self.run_traversal(&graph, &mut execution, &mut ctx, seeds, HashSet::new())
            .await?;
        Ok(execution)
    }

    /// Resumes a paused execution.
    ///
    /// `resume_context` is merged into the restored context and recorded
    /// as the suspended node's output, so downstream nodes can read the
    /// decision under `node_{id}`.
    pub async fn resume_execution(
        &self,
        workflow: &Workflow,
        execution_id: relaycrm_core::ExecutionId,
        resume_context: JsonValue,
    ) -> Result<WorkflowExecution, EngineError> {
        let mut execution = self
            .store
            .execution(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound { execution_id })?;
        if execution.status != crate::execution::ExecutionStatus::Paused {
            return Err(EngineError::NotPaused { execution_id });
        }
        let token = self
            .store
            .take_resume_token(execution_id)
            .await?
            .ok_or(EngineError::MissingResumeToken { execution_id })?;

        let graph = ExecutionGraph::build(&workflow.nodes, &workflow.edges)?;
        let mut ctx = ExecutionContext::from_snapshot(execution.context.clone());
        ctx.merge(resume_context.clone());
        ctx.insert_node_output(&token.node_id, resume_context);

        // Everything already logged as successful counts as executed, so
        // join nodes downstream of other branches see their dependencies
        // satisfied.
        let mut executed: HashSet<NodeId> = self
            .store
            .logs(execution_id)
            .await?
            .into_iter()
            .filter(|log| log.status == crate::execution::LogStatus::Success)
            .map(|log| log.node_id)
            .collect();
        executed.insert(token.node_id.clone());

        execution.resume();
        self.store.update_execution(&execution).await?;
        self.emit(ExecutionEvent::ExecutionResumed {
            execution_id,
            timestamp: Utc::now(),
        })
        .await;

        tracing::info!(
            execution_id = %execution_id,
            node_id = %token.node_id,
            "resuming workflow execution"
        );

        let seeds = graph
            .node(&token.node_id)
            .map(|n| n.dependents.clone())
            .unwrap_or_default();
        self.run_traversal(&graph, &mut execution, &mut ctx, seeds, executed)
            .await?;
        Ok(execution)
    }

    async fn run_traversal(
        &self,
        graph: &ExecutionGraph,
        execution: &mut WorkflowExecution,
        ctx: &mut ExecutionContext,
        seeds: Vec<NodeId>,
        mut executed: HashSet<NodeId>,
    ) -> Result<(), EngineError> {
        let mut queue: VecDeque<NodeId> = seeds.into();
        let mut queued: HashSet<NodeId> = queue.iter().cloned().collect();
        // Consecutive requeues without progress; clears whenever a node
        // runs. Exceeding the queue length means nothing left is runnable.
        let mut stalled = 0usize;

        while let Some(node_id) = queue.pop_front() {
            queued.remove(&node_id);
            if executed.contains(&node_id) {
                continue;
            }
            let Some(node) = graph.node(&node_id) else {
                continue;
            };

            if !node.dependencies.iter().all(|dep| executed.contains(dep)) {
                stalled += 1;
                if stalled > queue.len() {
                    // Everything left has been requeued without progress;
                    // record what was skipped so a partial run is
                    // distinguishable from a complete one.
                    let mut unreachable = vec![json!(node_id.as_str())];
                    unreachable.extend(queue.iter().map(|id| json!(id.as_str())));
                    tracing::warn!(
                        execution_id = %execution.id,
                        node_id = %node_id,
                        skipped = unreachable.len(),
                        "nodes unreachable: dependencies can no longer be satisfied"
                    );
                    ctx.insert("unreachable_nodes", JsonValue::Array(unreachable));
                    break;
                }
                queued.insert(node_id.clone());
                queue.push_back(node_id);
                continue;
            }
            stalled = 0;

            let run = match self.run_node(&node.spec, execution, ctx).await {
                Ok(run) => run,
                Err(error) => {
                    // Engine-level trouble (unregistered type, store
                    // failure) must not leave the record stuck in Running.
                    self.finalize_failure(execution, ctx, format!("node {node_id}: {error}"))
                        .await?;
                    return Err(error);
                }
            };
            match run {
                NodeRun::Outcome(NodeOutcome::Completed(result)) => {
                    executed.insert(node_id.clone());
                    ctx.insert_node_output(&node_id, result);
                    for dependent in &node.dependents {
                        if !executed.contains(dependent) && !queued.contains(dependent) {
                            queued.insert(dependent.clone());
                            queue.push_back(dependent.clone());
                        }
                    }
                }
                NodeRun::Outcome(NodeOutcome::Suspended(reason)) => {
                    let SuspendReason::Approval { approval_id } = &reason;
                    let token = ResumeToken {
                        execution_id: execution.id,
                        node_id: node_id.clone(),
                        approval_id: Some(*approval_id),
                        suspended_at: Utc::now(),
                    };
                    self.store.save_resume_token(&token).await?;
                    execution.pause();
                    execution.context = ctx.snapshot();
                    self.store.update_execution(execution).await?;
                    self.emit(ExecutionEvent::ExecutionPaused {
                        execution_id: execution.id,
                        node_id,
                        timestamp: Utc::now(),
                    })
                    .await;
                    return Ok(());
                }
                NodeRun::Failed(error) => {
                    let absorb = node.spec.continue_on_error
                        || (matches!(error, ProcessorError::Provider { .. })
                            && !node.spec.node_type.aborts_on_provider_failure());
                    if absorb {
                        tracing::warn!(
                            execution_id = %execution.id,
                            node_id = %node_id,
                            error = %error,
                            "absorbing node failure, traversal continues"
                        );
                        executed.insert(node_id.clone());
                        ctx.insert_node_output(
                            &node_id,
                            json!({"success": false, "error": error.to_string()}),
                        );
                        for dependent in &node.dependents {
                            if !executed.contains(dependent) && !queued.contains(dependent) {
                                queued.insert(dependent.clone());
                                queue.push_back(dependent.clone());
                            }
                        }
                    } else {
                        self.finalize_failure(execution, ctx, format!("node {node_id}: {error}"))
                            .await?;
                        return Ok(());
                    }
                }
            }
        }

        execution.succeed();
        execution.context = ctx.snapshot();
        self.store.update_execution(execution).await?;
        self.emit(ExecutionEvent::ExecutionCompleted {
            execution_id: execution.id,
            timestamp: Utc::now(),
        })
        .await;
        Ok(())
    }

    /// Marks the execution failed, persists it with the current context
    /// snapshot, and emits the terminal event.
    async fn finalize_failure(
        &self,
        execution: &mut WorkflowExecution,
        ctx: &ExecutionContext,
        message: String,
    ) -> Result<(), EngineError> {
        execution.fail(&message);
        execution.context = ctx.snapshot();
        self.store.update_execution(execution).await?;
        self.emit(ExecutionEvent::ExecutionFailed {
            execution_id: execution.id,
            error: message,
            timestamp: Utc::now(),
        })
        .await;
        Ok(())
    }

    async fn run_node(
        &self,
        spec: &NodeSpec,
        execution: &WorkflowExecution,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeRun, EngineError> {
        let Some(processor) = self.registry.get(spec.node_type) else {
            return Err(EngineError::UnknownNodeType {
                node_id: spec.id.clone(),
                node_type: spec.node_type,
            });
        };

        let input = processor
            .create_checkpoint(spec, ctx)
            .unwrap_or_else(|| spec.config.clone());
        let mut log = ExecutionLog::begin(execution.id, spec, input);
        self.store.append_log(&log).await?;
        self.emit(ExecutionEvent::NodeStarted {
            execution_id: execution.id,
            node_id: spec.id.clone(),
            node_type: spec.node_type,
            timestamp: Utc::now(),
        })
        .await;

        let started = Instant::now();
        let result = match processor.validate_inputs(spec, ctx) {
            Err(error) => Err(error),
            Ok(()) => processor.process(spec, ctx).await,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(NodeOutcome::Completed(output)) => {
                log.succeed(output.clone(), duration_ms);
                self.store.update_log(&log).await?;
                self.emit(ExecutionEvent::NodeCompleted {
                    execution_id: execution.id,
                    node_id: spec.id.clone(),
                    timestamp: Utc::now(),
                })
                .await;
                tracing::debug!(node_id = %spec.id, duration_ms, "node completed");
                Ok(NodeRun::Outcome(NodeOutcome::Completed(output)))
            }
            Ok(NodeOutcome::Suspended(reason)) => {
                log.succeed(json!({"suspended": true}), duration_ms);
                self.store.update_log(&log).await?;
                Ok(NodeRun::Outcome(NodeOutcome::Suspended(reason)))
            }
            Err(error) => {
                log.fail(
                    json!({"error": error.to_string(), "kind": error.kind()}),
                    duration_ms,
                );
                self.store.update_log(&log).await?;
                self.emit(ExecutionEvent::NodeFailed {
                    execution_id: execution.id,
                    node_id: spec.id.clone(),
                    error: error.to_string(),
                    timestamp: Utc::now(),
                })
                .await;
                Ok(NodeRun::Failed(error))
            }
        }
    }

    async fn emit(&self, event: ExecutionEvent) {
        if let Err(error) = self.broadcaster.broadcast(Envelope::new(event)).await {
            tracing::warn!(%error, "dropping execution event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::RecordingBroadcaster;
    use crate::execution::{ExecutionStatus, InMemoryExecutionStore, LogStatus};
    use crate::node::NodeType;
    use crate::processor::NodeProcessor;
    use async_trait::async_trait;
    use relaycrm_core::ApprovalId;
    use std::sync::Mutex;

    /// Completes with a fixed result, recording execution order.
    struct Step {
        result: JsonValue,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NodeProcessor for Step {
        async fn process(
            &self,
            node: &NodeSpec,
            _ctx: &mut ExecutionContext,
        ) -> Result<NodeOutcome, ProcessorError> {
            self.seen
                .lock()
                .expect("seen lock")
                .push(node.id.to_string());
            Ok(NodeOutcome::Completed(self.result.clone()))
        }
    }

    /// Fails with a configurable error.
    struct Failing {
        error: ProcessorError,
    }

    #[async_trait]
    impl NodeProcessor for Failing {
        async fn process(
            &self,
            _node: &NodeSpec,
            _ctx: &mut ExecutionContext,
        ) -> Result<NodeOutcome, ProcessorError> {
            Err(self.error.clone())
        }
    }

    /// Suspends with a fresh approval ID.
    struct Suspender;

    #[async_trait]
    impl NodeProcessor for Suspender {
        async fn process(
            &self,
            _node: &NodeSpec,
            _ctx: &mut ExecutionContext,
        ) -> Result<NodeOutcome, ProcessorError> {
            Ok(NodeOutcome::Suspended(SuspendReason::Approval {
                approval_id: ApprovalId::new(),
            }))
        }
    }

    struct Harness {
        engine: WorkflowEngine<InMemoryExecutionStore, RecordingBroadcaster>,
        store: Arc<InMemoryExecutionStore>,
        broadcaster: Arc<RecordingBroadcaster>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    fn harness(build: impl FnOnce(&mut ProcessorRegistry, Arc<Mutex<Vec<String>>>)) -> Harness {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ProcessorRegistry::new();
        registry.register(
            NodeType::Trigger,
            Arc::new(Step {
                result: json!({"triggered": true}),
                seen: seen.clone(),
            }),
        );
        build(&mut registry, seen.clone());

        let store = Arc::new(InMemoryExecutionStore::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let engine = WorkflowEngine::new(
            registry,
            store.clone(),
            broadcaster.clone(),
            EngineConfig::default(),
        );
        Harness {
            engine,
            store,
            broadcaster,
            seen,
        }
    }

    fn seen(h: &Harness) -> Vec<String> {
        h.seen.lock().expect("seen lock").clone()
    }

    #[tokio::test]
    async fn linear_workflow_runs_in_order_and_namespaces_outputs() {
        let h = harness(|registry, seen| {
            registry.register(
                NodeType::MergeData,
                Arc::new(Step {
                    result: json!({"success": true, "output": "merged"}),
                    seen,
                }),
            );
        });
        let workflow = Workflow::new("linear")
            .with_node("start", NodeType::Trigger, json!({}))
            .with_node("merge", NodeType::MergeData, json!({}))
            .with_edge("start", "merge");

        let execution = h
            .engine
            .execute_workflow(&workflow, json!({"lead": "ada"}), None)
            .await
            .expect("execute");

        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        assert_eq!(seen(&h), vec!["start", "merge"]);
        assert_eq!(execution.context["node_merge_output"], json!("merged"));
        assert_eq!(execution.context["lead"], json!("ada"));

        let logs = h.store.logs(execution.id).await.expect("logs");
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == LogStatus::Success));
    }

    #[tokio::test]
    async fn diamond_join_waits_for_both_branches() {
        let h = harness(|registry, seen| {
            registry.register(
                NodeType::MergeData,
                Arc::new(Step {
                    result: json!({"success": true}),
                    seen,
                }),
            );
        });
        let workflow = Workflow::new("diamond")
            .with_node("a", NodeType::Trigger, json!({}))
            .with_node("b", NodeType::MergeData, json!({}))
            .with_node("c", NodeType::MergeData, json!({}))
            .with_node("d", NodeType::MergeData, json!({}))
            .with_edge("a", "b")
            .with_edge("a", "c")
            .with_edge("b", "d")
            .with_edge("c", "d");

        let execution = h
            .engine
            .execute_workflow(&workflow, json!({}), None)
            .await
            .expect("execute");

        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        let order = seen(&h);
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], "a");
        assert_eq!(order[3], "d");
    }

    #[tokio::test]
    async fn aborting_failure_stops_downstream_nodes() {
        let h = harness(|registry, _| {
            registry.register(
                NodeType::AiPrompt,
                Arc::new(Failing {
                    error: ProcessorError::provider("model unavailable"),
                }),
            );
            registry.register(
                NodeType::MergeData,
                Arc::new(Step {
                    result: json!({}),
                    seen: Arc::new(Mutex::new(Vec::new())),
                }),
            );
        });
        let workflow = Workflow::new("abort")
            .with_node("a", NodeType::Trigger, json!({}))
            .with_node("b", NodeType::AiPrompt, json!({}))
            .with_node("c", NodeType::MergeData, json!({}))
            .with_edge("a", "b")
            .with_edge("b", "c");

        let execution = h
            .engine
            .execute_workflow(&workflow, json!({}), None)
            .await
            .expect("execute");

        assert_eq!(execution.status, ExecutionStatus::Failed);
        let message = execution.error_message.expect("error message");
        assert!(message.contains("node b"));
        assert!(message.contains("model unavailable"));

        // Only a and b have logs; c never ran.
        let logs = h.store.logs(execution.id).await.expect("logs");
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].status, LogStatus::Failed);
        assert_eq!(logs[1].error_details.as_ref().expect("details")["kind"], "provider");

        let events = h.broadcaster.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, ExecutionEvent::NodeFailed { node_id, .. } if node_id.as_str() == "b")));
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::ExecutionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn continue_on_error_absorbs_failure_and_runs_downstream() {
        let h = harness(|registry, seen| {
            registry.register(
                NodeType::AiPrompt,
                Arc::new(Failing {
                    error: ProcessorError::provider("model unavailable"),
                }),
            );
            registry.register(
                NodeType::MergeData,
                Arc::new(Step {
                    result: json!({"success": true}),
                    seen,
                }),
            );
        });
        let workflow = Workflow::new("absorb")
            .with_node("a", NodeType::Trigger, json!({}))
            .with_spec(NodeSpec::new("b", NodeType::AiPrompt, json!({})).continue_on_error())
            .with_node("c", NodeType::MergeData, json!({}))
            .with_edge("a", "b")
            .with_edge("b", "c");

        let execution = h
            .engine
            .execute_workflow(&workflow, json!({}), None)
            .await
            .expect("execute");

        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        assert!(seen(&h).contains(&"c".to_string()));
        assert_eq!(execution.context["node_b"]["success"], json!(false));
        assert!(execution.context["node_b"]["error"]
            .as_str()
            .expect("error")
            .contains("model unavailable"));
    }

    #[tokio::test]
    async fn send_provider_failures_are_soft_by_policy() {
        let h = harness(|registry, seen| {
            registry.register(
                NodeType::EmailSend,
                Arc::new(Failing {
                    error: ProcessorError::provider("smtp 451"),
                }),
            );
            registry.register(
                NodeType::MergeData,
                Arc::new(Step {
                    result: json!({}),
                    seen,
                }),
            );
        });
        let workflow = Workflow::new("soft-send")
            .with_node("send", NodeType::EmailSend, json!({}))
            .with_node("after", NodeType::MergeData, json!({}))
            .with_edge("send", "after");

        let execution = h
            .engine
            .execute_workflow(&workflow, json!({}), None)
            .await
            .expect("execute");

        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        assert_eq!(execution.context["node_send"]["success"], json!(false));
    }

    #[tokio::test]
    async fn send_validation_failures_still_abort() {
        let h = harness(|registry, _| {
            registry.register(
                NodeType::EmailSend,
                Arc::new(Failing {
                    error: ProcessorError::validation("hourly send limit reached"),
                }),
            );
        });
        let workflow =
            Workflow::new("hard-send").with_node("send", NodeType::EmailSend, json!({}));

        let execution = h
            .engine
            .execute_workflow(&workflow, json!({}), None)
            .await
            .expect("execute");

        assert_eq!(execution.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_node_type_is_an_engine_error() {
        let h = harness(|_, _| {});
        let workflow = Workflow::new("unknown").with_node("x", NodeType::HttpRequest, json!({}));

        let result = h.engine.execute_workflow(&workflow, json!({}), None).await;
        assert!(matches!(result, Err(EngineError::UnknownNodeType { .. })));
    }

    #[tokio::test]
    async fn unknown_node_type_marks_the_stored_execution_failed() {
        let h = harness(|_, _| {});
        let workflow = Workflow::new("unknown-mid")
            .with_node("a", NodeType::Trigger, json!({}))
            .with_node("x", NodeType::HttpRequest, json!({}))
            .with_edge("a", "x");

        let result = h.engine.execute_workflow(&workflow, json!({}), None).await;
        assert!(matches!(result, Err(EngineError::UnknownNodeType { .. })));

        // The persisted record must not be left in Running.
        let events = h.broadcaster.events();
        let Some(ExecutionEvent::ExecutionStarted { execution_id, .. }) = events.first() else {
            panic!("expected a start event");
        };
        let stored = h
            .store
            .execution(*execution_id)
            .await
            .expect("get")
            .expect("stored");
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert!(stored.error_message.expect("error message").contains("node x"));
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::ExecutionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn skipped_unreachable_nodes_are_recorded_in_the_context() {
        let h = harness(|registry, seen| {
            registry.register(
                NodeType::MergeData,
                Arc::new(Step {
                    result: json!({"success": true}),
                    seen,
                }),
            );
        });
        // `join` needs both `a` and `other`; starting from `a` alone
        // leaves it unrunnable.
        let workflow = Workflow::new("partial")
            .with_node("a", NodeType::Trigger, json!({}))
            .with_node("other", NodeType::Trigger, json!({}))
            .with_node("join", NodeType::MergeData, json!({}))
            .with_edge("a", "join")
            .with_edge("other", "join");

        let execution = h
            .engine
            .execute_from(&workflow, json!({}), None, Some(&NodeId::new("a")))
            .await
            .expect("execute");

        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        assert!(!seen(&h).contains(&"join".to_string()));
        assert_eq!(execution.context["unreachable_nodes"], json!(["join"]));
    }

    #[tokio::test]
    async fn cyclic_workflow_is_rejected_before_any_node_runs() {
        let h = harness(|_, _| {});
        let workflow = Workflow::new("cycle")
            .with_node("a", NodeType::Trigger, json!({}))
            .with_node("b", NodeType::Trigger, json!({}))
            .with_edge("a", "b")
            .with_edge("b", "a");

        let result = h.engine.execute_workflow(&workflow, json!({}), None).await;
        assert!(matches!(
            result,
            Err(EngineError::Graph(GraphError::CycleDetected))
        ));
        assert!(seen(&h).is_empty());
    }

    #[tokio::test]
    async fn unknown_start_node_is_rejected() {
        let h = harness(|_, _| {});
        let workflow = Workflow::new("start").with_node("a", NodeType::Trigger, json!({}));

        let result = h
            .engine
            .execute_from(&workflow, json!({}), None, Some(&NodeId::new("ghost")))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Graph(GraphError::UnknownStartNode { .. }))
        ));
    }

    #[tokio::test]
    async fn suspension_pauses_and_resume_continues() {
        let h = harness(|registry, seen| {
            registry.register(NodeType::Approval, Arc::new(Suspender));
            registry.register(
                NodeType::MergeData,
                Arc::new(Step {
                    result: json!({"success": true}),
                    seen,
                }),
            );
        });
        let workflow = Workflow::new("gated")
            .with_node("start", NodeType::Trigger, json!({}))
            .with_node("gate", NodeType::Approval, json!({}))
            .with_node("after", NodeType::MergeData, json!({}))
            .with_edge("start", "gate")
            .with_edge("gate", "after");

        let paused = h
            .engine
            .execute_workflow(&workflow, json!({"lead": "ada"}), None)
            .await
            .expect("execute");

        assert_eq!(paused.status, ExecutionStatus::Paused);
        assert!(!seen(&h).contains(&"after".to_string()));
        // Context was persisted at suspension time.
        assert_eq!(paused.context["lead"], json!("ada"));
        assert!(h
            .broadcaster
            .events()
            .iter()
            .any(|e| matches!(e, ExecutionEvent::ExecutionPaused { .. })));

        let resumed = h
            .engine
            .resume_execution(&workflow, paused.id, json!({"approved": true}))
            .await
            .expect("resume");

        assert_eq!(resumed.status, ExecutionStatus::Succeeded);
        assert!(seen(&h).contains(&"after".to_string()));
        // The approval decision is visible as the gate's output.
        assert_eq!(resumed.context["node_gate"]["approved"], json!(true));
        assert_eq!(resumed.context["approved"], json!(true));
    }

    #[tokio::test]
    async fn resume_requires_a_paused_execution() {
        let h = harness(|_, _| {});
        let workflow = Workflow::new("only-start").with_node("a", NodeType::Trigger, json!({}));

        let done = h
            .engine
            .execute_workflow(&workflow, json!({}), None)
            .await
            .expect("execute");
        assert_eq!(done.status, ExecutionStatus::Succeeded);

        let result = h.engine.resume_execution(&workflow, done.id, json!({})).await;
        assert!(matches!(result, Err(EngineError::NotPaused { .. })));
    }

    #[tokio::test]
    async fn resume_consumes_the_token() {
        let h = harness(|registry, _| {
            registry.register(NodeType::Approval, Arc::new(Suspender));
        });
        let workflow = Workflow::new("gate-only").with_node("gate", NodeType::Approval, json!({}));

        let paused = h
            .engine
            .execute_workflow(&workflow, json!({}), None)
            .await
            .expect("execute");
        h.engine
            .resume_execution(&workflow, paused.id, json!({}))
            .await
            .expect("resume");

        // A second resume finds no token (and the execution is terminal).
        let result = h.engine.resume_execution(&workflow, paused.id, json!({})).await;
        assert!(matches!(result, Err(EngineError::NotPaused { .. })));
    }

    #[tokio::test]
    async fn events_bracket_the_execution() {
        let h = harness(|_, _| {});
        let workflow = Workflow::new("events").with_node("a", NodeType::Trigger, json!({}));

        h.engine
            .execute_workflow(&workflow, json!({}), None)
            .await
            .expect("execute");

        let events = h.broadcaster.events();
        assert!(matches!(events.first(), Some(ExecutionEvent::ExecutionStarted { .. })));
        assert!(matches!(events.last(), Some(ExecutionEvent::ExecutionCompleted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, ExecutionEvent::NodeStarted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, ExecutionEvent::NodeCompleted { .. })));
    }
}
