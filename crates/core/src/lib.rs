pub mod audit;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod metrics;
pub mod plan;
pub mod planner;
pub mod policy;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
pub use context::ContextSnapshot;
pub use domain::action::{ActionPayload, ActionStatus, ActionType, PendingAction, PendingActionId};
pub use domain::conversation::{
    Conversation, ConversationId, ConversationStatus, Message, MessageId, MessageRole,
};
pub use domain::event::{
    Event, EventId, EventPayload, EventReceipt, EventStatus, EventType, ReceiptStatus,
};
pub use domain::job::{Job, JobId, JobStatus};
pub use errors::{DomainError, InterfaceError, OrchestrationError};
pub use metrics::{InMemoryMetricsSink, MetricSample, MetricsSink, TracingMetricsSink};
pub use plan::{
    AgentKind, Plan, PlanId, PlanOutcome, PlanState, Step, StepAction, StepId, StepState, StepTrace,
};
pub use policy::PlannerPolicy;
