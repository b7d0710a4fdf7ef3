//! Polling wait nodes: response, record event, and condition waits.
//!
//! All three poll an `EventSource` at a clamped interval (5-30 seconds)
//! until something matches or the timeout elapses. On timeout the default
//! is a soft `{success: false, timeout_reached: true}` result; a node can
//! opt into failing instead.

use crate::condition::{evaluate_group, ConditionClause, LogicOperator};
use crate::context::ExecutionContext;
use crate::node::NodeSpec;
use crate::processor::{parse_config, NodeOutcome, NodeProcessor, ProcessorError};
use crate::template::{self, TemplateMode};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MIN_POLL_SECS: u64 = 5;
const MAX_POLL_SECS: u64 = 30;

/// What kind of external occurrence a poll looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An inbound reply on a conversation.
    Response,
    /// A record lifecycle event (created/updated/deleted).
    RecordEvent,
    /// A fresh snapshot of external data, for condition polling.
    Snapshot,
}

/// Event source failure.
#[derive(Debug, Clone)]
pub struct EventSourceError {
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for EventSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event source failure: {}", self.message)
    }
}

impl Error for EventSourceError {}

/// The polling seam: one check, no blocking.
///
/// `Ok(None)` means nothing matched yet; the node keeps polling.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Checks once for an event matching the query.
    async fn poll(
        &self,
        kind: EventKind,
        query: &JsonValue,
    ) -> Result<Option<JsonValue>, EventSourceError>;
}

/// A scripted event source: yields `None` a set number of times, then the
/// configured value.
pub struct ScriptedEventSource {
    responses: Mutex<VecDeque<Option<JsonValue>>>,
}

impl ScriptedEventSource {
    /// Yields `None` for `misses` polls, then `value` forever.
    #[must_use]
    pub fn after_misses(misses: usize, value: JsonValue) -> Self {
        let mut responses: VecDeque<Option<JsonValue>> =
            std::iter::repeat_with(|| None).take(misses).collect();
        responses.push_back(Some(value));
        Self {
            responses: Mutex::new(responses),
        }
    }

    /// Never yields an event.
    #[must_use]
    pub fn never() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn poll(
        &self,
        _kind: EventKind,
        _query: &JsonValue,
    ) -> Result<Option<JsonValue>, EventSourceError> {
        let mut responses = self.responses.lock().expect("script lock poisoned");
        match responses.front() {
            None => Ok(None),
            Some(None) => {
                responses.pop_front();
                Ok(None)
            }
            // Terminal value stays so repeat polls keep matching.
            Some(Some(value)) => Ok(Some(value.clone())),
        }
    }
}

/// What to do when the timeout elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Complete with a soft timeout result.
    #[default]
    Continue,
    /// Fail the node.
    Fail,
}

#[derive(Debug, Deserialize)]
struct PollSettings {
    #[serde(default = "default_interval")]
    check_interval_seconds: u64,
    #[serde(default = "default_timeout")]
    timeout_seconds: u64,
    #[serde(default)]
    timeout_action: TimeoutAction,
}

fn default_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    3600
}

impl PollSettings {
    fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds.clamp(MIN_POLL_SECS, MAX_POLL_SECS))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Shared poll loop. `matcher` turns a polled value into a result, or
/// `None` to keep waiting.
async fn poll_until(
    events: &dyn EventSource,
    kind: EventKind,
    query: &JsonValue,
    settings: &PollSettings,
    what: &str,
    mut matcher: impl FnMut(JsonValue) -> Result<Option<JsonValue>, ProcessorError> + Send,
) -> Result<NodeOutcome, ProcessorError> {
    let started = tokio::time::Instant::now();
    loop {
        let polled = events
            .poll(kind, query)
            .await
            .map_err(|e| ProcessorError::provider(e.to_string()))?;
        if let Some(value) = polled {
            if let Some(result) = matcher(value)? {
                return Ok(NodeOutcome::Completed(result));
            }
        }
        if started.elapsed() >= settings.timeout() {
            return match settings.timeout_action {
                TimeoutAction::Fail => {
                    Err(ProcessorError::timeout(format!("gave up waiting for {what}")))
                }
                TimeoutAction::Continue => Ok(NodeOutcome::Completed(json!({
                    "success": false,
                    "timeout_reached": true,
                }))),
            };
        }
        tokio::time::sleep(settings.interval()).await;
    }
}

#[derive(Debug, Deserialize)]
struct WaitForResponseConfig {
    /// Templated; usually `{last_sent_conversation_id}`.
    conversation_id: String,
    #[serde(default)]
    template_mode: TemplateMode,
    #[serde(flatten)]
    poll: PollSettings,
}

/// Processor for [`crate::node::NodeType::WaitForResponse`].
pub struct WaitForResponseProcessor {
    events: Arc<dyn EventSource>,
}

impl WaitForResponseProcessor {
    /// Creates the processor.
    pub fn new(events: Arc<dyn EventSource>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl NodeProcessor for WaitForResponseProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: WaitForResponseConfig = parse_config(node)?;
        let conversation_id =
            template::resolve(&config.conversation_id, ctx, config.template_mode)
                .map_err(|e| ProcessorError::validation(e.to_string()))?;
        let query = json!({"conversation_id": conversation_id});

        poll_until(
            self.events.as_ref(),
            EventKind::Response,
            &query,
            &config.poll,
            "an inbound response",
            |event| {
                Ok(Some(json!({
                    "success": true,
                    "timeout_reached": false,
                    "output": event,
                })))
            },
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct WaitForRecordEventConfig {
    record_type: String,
    /// created | updated | deleted.
    event: String,
    #[serde(default)]
    filter: JsonValue,
    #[serde(flatten)]
    poll: PollSettings,
}

/// Processor for [`crate::node::NodeType::WaitForRecordEvent`].
pub struct WaitForRecordEventProcessor {
    events: Arc<dyn EventSource>,
}

impl WaitForRecordEventProcessor {
    /// Creates the processor.
    pub fn new(events: Arc<dyn EventSource>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl NodeProcessor for WaitForRecordEventProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        _ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: WaitForRecordEventConfig = parse_config(node)?;
        let query = json!({
            "record_type": config.record_type,
            "event": config.event,
            "filter": config.filter,
        });

        poll_until(
            self.events.as_ref(),
            EventKind::RecordEvent,
            &query,
            &config.poll,
            "a record event",
            |event| {
                Ok(Some(json!({
                    "success": true,
                    "timeout_reached": false,
                    "output": event,
                })))
            },
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct WaitForConditionConfig {
    conditions: Vec<ConditionClause>,
    #[serde(default)]
    logic: LogicOperator,
    /// Passed to the event source to describe what data to fetch.
    #[serde(default)]
    data_query: JsonValue,
    #[serde(flatten)]
    poll: PollSettings,
}

/// Processor for [`crate::node::NodeType::WaitForCondition`].
pub struct WaitForConditionProcessor {
    events: Arc<dyn EventSource>,
}

impl WaitForConditionProcessor {
    /// Creates the processor.
    pub fn new(events: Arc<dyn EventSource>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl NodeProcessor for WaitForConditionProcessor {
    async fn process(
        &self,
        node: &NodeSpec,
        _ctx: &mut ExecutionContext,
    ) -> Result<NodeOutcome, ProcessorError> {
        let config: WaitForConditionConfig = parse_config(node)?;
        if config.conditions.is_empty() {
            return Err(ProcessorError::validation(
                "wait_for_condition needs at least one condition",
            ));
        }

        let conditions = config.conditions.clone();
        let logic = config.logic;
        poll_until(
            self.events.as_ref(),
            EventKind::Snapshot,
            &config.data_query,
            &config.poll,
            "the condition to hold",
            move |snapshot| {
                let (holds, details) = evaluate_group(&conditions, logic, &snapshot)
                    .map_err(|e| ProcessorError::validation(e.to_string()))?;
                if holds {
                    Ok(Some(json!({
                        "success": true,
                        "condition_met": true,
                        "timeout_reached": false,
                        "clause_results": details,
                        "output": snapshot,
                    })))
                } else {
                    Ok(None)
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use relaycrm_core::{ExecutionId, WorkflowId};

    fn ctx() -> ExecutionContext {
        let mut ctx =
            ExecutionContext::seed(json!({}), "t", ExecutionId::new(), WorkflowId::new());
        ctx.insert("last_sent_conversation_id", json!("conv_1"));
        ctx
    }

    #[test]
    fn poll_interval_is_clamped() {
        let fast = PollSettings {
            check_interval_seconds: 1,
            timeout_seconds: 60,
            timeout_action: TimeoutAction::Continue,
        };
        assert_eq!(fast.interval(), Duration::from_secs(MIN_POLL_SECS));

        let slow = PollSettings {
            check_interval_seconds: 300,
            timeout_seconds: 60,
            timeout_action: TimeoutAction::Continue,
        };
        assert_eq!(slow.interval(), Duration::from_secs(MAX_POLL_SECS));
    }

    #[tokio::test(start_paused = true)]
    async fn response_arriving_after_a_few_polls_completes() {
        let events = Arc::new(ScriptedEventSource::after_misses(
            3,
            json!({"body": "yes, let's talk"}),
        ));
        let processor = WaitForResponseProcessor::new(events);
        let node = NodeSpec::new(
            "wait",
            NodeType::WaitForResponse,
            json!({"conversation_id": "{last_sent_conversation_id}", "check_interval_seconds": 10}),
        );

        let NodeOutcome::Completed(result) = processor
            .process(&node, &mut ctx())
            .await
            .expect("process")
        else {
            panic!("expected completion");
        };
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["output"]["body"], json!("yes, let's talk"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_defaults_to_a_soft_result() {
        let processor = WaitForResponseProcessor::new(Arc::new(ScriptedEventSource::never()));
        let node = NodeSpec::new(
            "wait",
            NodeType::WaitForResponse,
            json!({"conversation_id": "conv_1", "timeout_seconds": 60}),
        );

        let NodeOutcome::Completed(result) = processor
            .process(&node, &mut ctx())
            .await
            .expect("process")
        else {
            panic!("expected completion");
        };
        assert_eq!(result["timeout_reached"], json!(true));
        assert_eq!(result["success"], json!(false));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_can_fail_the_node() {
        let processor = WaitForResponseProcessor::new(Arc::new(ScriptedEventSource::never()));
        let node = NodeSpec::new(
            "wait",
            NodeType::WaitForResponse,
            json!({
                "conversation_id": "conv_1",
                "timeout_seconds": 60,
                "timeout_action": "fail"
            }),
        );

        let result = processor.process(&node, &mut ctx()).await;
        assert!(matches!(result, Err(ProcessorError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn record_event_wait_returns_the_event() {
        let events = Arc::new(ScriptedEventSource::after_misses(
            1,
            json!({"event": "created", "record": {"id": "r1"}}),
        ));
        let processor = WaitForRecordEventProcessor::new(events);
        let node = NodeSpec::new(
            "wait",
            NodeType::WaitForRecordEvent,
            json!({"record_type": "deal", "event": "created"}),
        );

        let NodeOutcome::Completed(result) = processor
            .process(&node, &mut ctx())
            .await
            .expect("process")
        else {
            panic!("expected completion");
        };
        assert_eq!(result["output"]["record"]["id"], json!("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn condition_wait_keeps_polling_until_it_holds() {
        // First snapshot misses the threshold, the second passes it; the
        // scripted source holds its terminal value, so script the passing
        // snapshot as terminal.
        let events = Arc::new(ScriptedEventSource::after_misses(2, json!({"score": 80})));
        let processor = WaitForConditionProcessor::new(events);
        let node = NodeSpec::new(
            "wait",
            NodeType::WaitForCondition,
            json!({
                "conditions": [
                    {"left": {"context_path": "score"}, "operator": ">=", "right": 75, "output": ""}
                ],
                "data_query": {"record": "deal_1"}
            }),
        );

        let NodeOutcome::Completed(result) = processor
            .process(&node, &mut ctx())
            .await
            .expect("process")
        else {
            panic!("expected completion");
        };
        assert_eq!(result["condition_met"], json!(true));
        assert_eq!(result["output"]["score"], json!(80));
    }

    #[tokio::test]
    async fn condition_wait_requires_conditions() {
        let processor = WaitForConditionProcessor::new(Arc::new(ScriptedEventSource::never()));
        let node = NodeSpec::new("wait", NodeType::WaitForCondition, json!({"conditions": []}));

        let result = processor.process(&node, &mut ctx()).await;
        assert!(matches!(result, Err(ProcessorError::Validation { .. })));
    }
}
