//! Policy-driven planning: one pure function from (event, snapshot, policy)
//! to an ordered step list. Re-planning after a restart, or inside a test,
//! reproduces the same sequence because nothing here reads clocks, ids, or
//! ambient state.

use crate::context::ContextSnapshot;
use crate::domain::event::{Event, EventPayload};
use crate::plan::{AgentKind, Plan, Step, StepAction, StepId};
use crate::policy::PlannerPolicy;

pub fn plan(event: &Event, snapshot: &ContextSnapshot, policy: &PlannerPolicy) -> Plan {
    let mut steps = Vec::new();
    let mut push = |agent: AgentKind, action: StepAction, requires_approval: bool| {
        let step_id = StepId(format!("{}-step-{}", event.id.0, steps.len()));
        steps.push(Step { step_id, agent, action, requires_approval });
    };

    match &event.payload {
        EventPayload::MissedCall { phone, .. } => {
            push(AgentKind::Intake, StepAction::SendReply { to: phone.clone() }, false);
        }
        EventPayload::InboundSms { phone, body } => {
            push(AgentKind::Intake, StepAction::SendReply { to: phone.clone() }, false);
            if qualifies_for_quote(body, snapshot) {
                push(
                    AgentKind::Quote,
                    StepAction::SendQuote {
                        to: phone.clone(),
                        service_hint: matched_service(body, snapshot),
                    },
                    !policy.auto_quote_enabled,
                );
            }
        }
        EventPayload::WebLead { phone, name, requested_service, notes } => {
            push(
                AgentKind::Intake,
                StepAction::CreateLead {
                    name: name.clone(),
                    phone: phone.clone(),
                    requested_service: requested_service.clone(),
                    notes: notes.clone(),
                },
                false,
            );
            push(AgentKind::Intake, StepAction::SendReply { to: phone.clone() }, false);
            push(
                AgentKind::Schedule,
                StepAction::BookJob {
                    name: name.clone(),
                    phone: phone.clone(),
                    requested_service: requested_service.clone(),
                },
                policy.approvals_required_for_booking,
            );
        }
        EventPayload::JobCompleted { job_id, phone } => {
            let recipient = phone.clone().or_else(|| {
                snapshot
                    .conversation
                    .as_ref()
                    .map(|conversation| conversation.customer_phone.clone())
            });
            if policy.review_requests_enabled {
                if let Some(to) = recipient {
                    push(
                        AgentKind::Reviews,
                        StepAction::RequestReview { to, job_id: job_id.clone() },
                        false,
                    );
                }
            }
        }
    }

    Plan::new(event.id.clone(), steps)
}

/// A text qualifies the lead for quoting when it asks about pricing or names
/// one of the offered services. Deterministic by design: the agent adapter
/// drafts quote content, but never decides whether a quote is planned.
fn qualifies_for_quote(body: &str, snapshot: &ContextSnapshot) -> bool {
    let normalized = body.to_ascii_lowercase();
    const PRICE_SIGNALS: [&str; 5] = ["quote", "price", "cost", "estimate", "how much"];
    if PRICE_SIGNALS.iter().any(|signal| normalized.contains(signal)) {
        return true;
    }
    matched_service(body, snapshot).is_some()
}

fn matched_service(body: &str, snapshot: &ContextSnapshot) -> Option<String> {
    let normalized = body.to_ascii_lowercase();
    snapshot
        .business
        .services
        .iter()
        .find(|service| normalized.contains(&service.to_ascii_lowercase()))
        .cloned()
}
