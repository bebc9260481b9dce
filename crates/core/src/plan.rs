use serde::{Deserialize, Serialize};

use crate::domain::action::PendingActionId;
use crate::domain::event::EventId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Intake,
    Quote,
    Schedule,
    Reviews,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Quote => "quote",
            Self::Schedule => "schedule",
            Self::Reviews => "reviews",
        }
    }
}

/// Planned operation with its typed inputs. Content (reply text, price,
/// proposed date) is resolved by the matching agent executor at run time;
/// the planner only decides *what* happens and in which order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    SendReply {
        to: String,
    },
    SendQuote {
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service_hint: Option<String>,
    },
    CreateLead {
        name: String,
        phone: String,
        requested_service: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    BookJob {
        name: String,
        phone: String,
        requested_service: String,
    },
    RequestReview {
        to: String,
        job_id: String,
    },
}

impl StepAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendReply { .. } => "send_reply",
            Self::SendQuote { .. } => "send_quote",
            Self::CreateLead { .. } => "create_lead",
            Self::BookJob { .. } => "book_job",
            Self::RequestReview { .. } => "request_review",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: StepId,
    pub agent: AgentKind,
    pub action: StepAction,
    pub requires_approval: bool,
}

/// Ordered, policy-derived sequence of steps for one event. Transient: it is
/// reproduced by replanning rather than persisted, so its ids are derived
/// deterministically from the event id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: PlanId,
    pub event_id: EventId,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(event_id: EventId, steps: Vec<Step>) -> Self {
        let plan_id = PlanId(format!("plan-{}", event_id.0));
        Self { plan_id, event_id, steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Suspended,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Suspended => "suspended",
        }
    }

    /// Valid per-step transitions: pending -> running -> one terminal state.
    pub fn can_transition_to(&self, next: StepState) -> bool {
        matches!(
            (*self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Suspended)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Running,
    Completed,
    Failed,
    Suspended,
}

impl PlanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Suspended => "suspended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Per-step execution record kept in plan order. Failure reasons live here
/// so callers receive the trace of completed steps alongside the error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTrace {
    pub step_id: StepId,
    pub agent: AgentKind,
    pub action: String,
    pub state: StepState,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub plan_id: PlanId,
    pub event_id: EventId,
    pub state: PlanState,
    pub trace: Vec<StepTrace>,
    pub pending_action_id: Option<PendingActionId>,
    pub error: Option<String>,
}

impl PlanOutcome {
    pub fn completed(plan: &Plan, trace: Vec<StepTrace>) -> Self {
        Self {
            plan_id: plan.plan_id.clone(),
            event_id: plan.event_id.clone(),
            state: PlanState::Completed,
            trace,
            pending_action_id: None,
            error: None,
        }
    }

    pub fn suspended(plan: &Plan, trace: Vec<StepTrace>, pending_action_id: PendingActionId) -> Self {
        Self {
            plan_id: plan.plan_id.clone(),
            event_id: plan.event_id.clone(),
            state: PlanState::Suspended,
            trace,
            pending_action_id: Some(pending_action_id),
            error: None,
        }
    }

    pub fn failed(plan: &Plan, trace: Vec<StepTrace>, error: impl Into<String>) -> Self {
        Self {
            plan_id: plan.plan_id.clone(),
            event_id: plan.event_id.clone(),
            state: PlanState::Failed,
            trace,
            pending_action_id: None,
            error: Some(error.into()),
        }
    }
}
