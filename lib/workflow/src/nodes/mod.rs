//! Node processors, one module per family of node types.

pub mod ai;
pub mod approval;
pub mod condition;
pub mod for_each;
pub mod http;
pub mod merge;
pub mod record;
pub mod send;
pub mod sub_workflow;
pub mod trigger;
pub mod wait;
pub mod wait_event;

use crate::approval::ApprovalStore;
use crate::node::NodeType;
use crate::processor::ProcessorRegistry;
use relaycrm_ai::CompletionProvider;
use relaycrm_channels::{ChannelType, ConnectionStore, MessagingProvider};
use relaycrm_core::TenantId;
use std::sync::Arc;

use self::record::RecordStore;
use self::sub_workflow::SubWorkflowRunner;
use self::wait_event::EventSource;

/// Everything the stock processors need to talk to the outside world.
///
/// Callers wire these up once and hand them to [`default_registry`];
/// tests swap in the in-memory and recording doubles.
pub struct ProcessorServices {
    /// Tenant the engine runs on behalf of.
    pub tenant_id: TenantId,
    /// AI completion backend.
    pub completions: Arc<dyn CompletionProvider>,
    /// Outbound message delivery.
    pub messaging: Arc<dyn MessagingProvider>,
    /// Channel connections and send quotas.
    pub connections: Arc<dyn ConnectionStore>,
    /// CRM record storage.
    pub records: Arc<dyn RecordStore>,
    /// Approval request storage.
    pub approvals: Arc<dyn ApprovalStore>,
    /// Event polling backend for the wait-for-* nodes.
    pub events: Arc<dyn EventSource>,
    /// Child execution runner for sub-workflow and fan-out nodes.
    pub sub_workflows: Arc<dyn SubWorkflowRunner>,
    /// Shared HTTP client for outbound requests and webhooks.
    pub http: reqwest::Client,
}

/// Builds a registry covering every stock node type.
#[must_use]
pub fn default_registry(services: ProcessorServices) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();

    registry.register(NodeType::Trigger, Arc::new(trigger::TriggerProcessor));
    registry.register(NodeType::Condition, Arc::new(condition::ConditionProcessor));
    registry.register(NodeType::MergeData, Arc::new(merge::MergeDataProcessor));
    registry.register(NodeType::WaitDelay, Arc::new(wait::WaitDelayProcessor));

    registry.register(
        NodeType::AiPrompt,
        Arc::new(ai::AiPromptProcessor::new(
            services.completions.clone(),
            services.tenant_id,
        )),
    );
    registry.register(
        NodeType::AiAnalysis,
        Arc::new(ai::AiAnalysisProcessor::new(
            services.completions.clone(),
            services.tenant_id,
        )),
    );

    for (node_type, channel) in [
        (NodeType::EmailSend, ChannelType::Email),
        (NodeType::WhatsappSend, ChannelType::Whatsapp),
        (NodeType::LinkedinSend, ChannelType::Linkedin),
        (NodeType::SmsSend, ChannelType::Sms),
    ] {
        registry.register(
            node_type,
            Arc::new(send::SendProcessor::new(
                channel,
                services.connections.clone(),
                services.messaging.clone(),
            )),
        );
    }

    registry.register(
        NodeType::RecordCreate,
        Arc::new(record::RecordCreateProcessor::new(services.records.clone())),
    );
    registry.register(
        NodeType::RecordUpdate,
        Arc::new(record::RecordUpdateProcessor::new(services.records.clone())),
    );
    registry.register(
        NodeType::RecordDelete,
        Arc::new(record::RecordDeleteProcessor::new(services.records.clone())),
    );
    registry.register(
        NodeType::RecordFind,
        Arc::new(record::RecordFindProcessor::new(services.records.clone())),
    );

    registry.register(
        NodeType::WaitForResponse,
        Arc::new(wait_event::WaitForResponseProcessor::new(
            services.events.clone(),
        )),
    );
    registry.register(
        NodeType::WaitForRecordEvent,
        Arc::new(wait_event::WaitForRecordEventProcessor::new(
            services.events.clone(),
        )),
    );
    registry.register(
        NodeType::WaitForCondition,
        Arc::new(wait_event::WaitForConditionProcessor::new(
            services.events.clone(),
        )),
    );

    registry.register(
        NodeType::HttpRequest,
        Arc::new(http::HttpRequestProcessor::new(services.http.clone())),
    );
    registry.register(
        NodeType::WebhookOut,
        Arc::new(http::WebhookOutProcessor::new(services.http.clone())),
    );

    registry.register(
        NodeType::Approval,
        Arc::new(approval::ApprovalProcessor::new(services.approvals.clone())),
    );

    registry.register(
        NodeType::SubWorkflow,
        Arc::new(sub_workflow::SubWorkflowProcessor::new(
            services.sub_workflows.clone(),
        )),
    );
    registry.register(
        NodeType::ReusableWorkflow,
        Arc::new(sub_workflow::ReusableWorkflowProcessor::new(
            services.sub_workflows.clone(),
        )),
    );
    registry.register(
        NodeType::ForEach,
        Arc::new(for_each::ForEachProcessor::new(
            services.sub_workflows.clone(),
        )),
    );

    registry
}
