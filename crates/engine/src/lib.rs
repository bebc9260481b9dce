//! Orchestration engine - the durable core between event ingress and the
//! outside world
//!
//! One `handle_event` invocation runs the full pipeline: idempotent intake,
//! context building, deterministic planning, and ordered step execution with
//! durable suspension around human approval. Approval resolution is a
//! separate entry point that replays a stored payload; it never re-enters a
//! plan.
//!
//! The engine holds no in-process locks. Concurrency safety comes from two
//! persistence guarantees: the event-receipt uniqueness constraint and the
//! status-guarded compare-and-set on pending actions.

pub mod approvals;
pub mod context;
mod effects;
pub mod intake;
pub mod runner;
#[cfg(test)]
pub(crate) mod testkit;

use std::sync::Arc;

use leadline_agent::LlmClient;
use leadline_comms::{FsmClient, SmsDelivery};
use leadline_core::config::BusinessProfile;
use leadline_core::domain::action::{ActionStatus, PendingAction};
use leadline_core::domain::event::Event;
use leadline_core::errors::OrchestrationError;
use leadline_core::metrics::MetricsSink;
use leadline_core::policy::PlannerPolicy;
use leadline_db::repositories::{
    AuditLogRepository, ConversationRepository, EventReceiptRepository, EventRepository,
    JobRepository, MessageRepository, PendingActionRepository,
};

pub use approvals::ApprovalService;
pub use context::ContextBuilder;
pub use intake::{EventIntake, EventRequest, HandleEventOutcome};
pub use runner::StepRunner;

/// Everything the engine touches, injected once at bootstrap. Repositories
/// and tool facades are trait objects so tests swap in in-memory and
/// recording implementations.
pub struct Services {
    pub events: Arc<dyn EventRepository>,
    pub receipts: Arc<dyn EventReceiptRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub actions: Arc<dyn PendingActionRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub audit_log: Arc<dyn AuditLogRepository>,
    pub sms: Arc<dyn SmsDelivery>,
    pub fsm: Arc<dyn FsmClient>,
    pub metrics: Arc<dyn MetricsSink>,
    pub llm: Arc<dyn LlmClient>,
    pub business: BusinessProfile,
    pub policy: PlannerPolicy,
}

impl Services {
    /// Audit writes must never take down an orchestration run; a failed
    /// append degrades to a warning in the log stream.
    pub(crate) async fn audit(&self, entry: leadline_core::audit::AuditEvent) {
        if let Err(error) = self.audit_log.append(entry.clone()).await {
            tracing::warn!(
                event_name = "audit.append_failed",
                action = %entry.action,
                correlation_id = %entry.correlation_id,
                error = %error,
                "audit entry could not be persisted"
            );
        }
    }
}

/// Facade wiring the intake and approval entry points over one shared
/// service set.
pub struct Engine {
    services: Arc<Services>,
    intake: EventIntake,
    approvals: ApprovalService,
}

impl Engine {
    pub fn new(services: Services) -> Self {
        let services = Arc::new(services);
        Self {
            intake: EventIntake::new(services.clone()),
            approvals: ApprovalService::new(services.clone()),
            services,
        }
    }

    pub async fn handle_event(
        &self,
        request: EventRequest,
    ) -> Result<HandleEventOutcome, OrchestrationError> {
        self.intake.handle_event(request).await
    }

    pub async fn approve_action(
        &self,
        action_id: &str,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<PendingAction, OrchestrationError> {
        self.approvals.approve_action(action_id, resolved_by, notes).await
    }

    pub async fn reject_action(
        &self,
        action_id: &str,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<PendingAction, OrchestrationError> {
        self.approvals.reject_action(action_id, resolved_by, notes).await
    }

    /// Pending-approval inbox for the operator surface.
    pub async fn pending_actions(&self, limit: u32) -> Result<Vec<PendingAction>, OrchestrationError> {
        self.services
            .actions
            .list_by_status(ActionStatus::Pending, limit)
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))
    }

    /// Recent event feed (status + error) for the excluded UI layer.
    pub async fn recent_events(&self, limit: u32) -> Result<Vec<Event>, OrchestrationError> {
        self.services
            .events
            .list_recent(limit)
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))
    }
}
