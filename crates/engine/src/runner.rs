use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use leadline_agent::{IntakeAgent, QuoteAgent, ReviewAgent, ScheduleAgent};
use leadline_comms::{FsmClient, NewLead};
use leadline_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use leadline_core::context::ContextSnapshot;
use leadline_core::domain::action::{ActionPayload, ActionType, PendingAction, PendingActionId};
use leadline_core::domain::conversation::Conversation;
use leadline_core::domain::event::Event;
use leadline_core::errors::OrchestrationError;
use leadline_core::metrics::MetricsSink;
use leadline_core::plan::{Plan, PlanOutcome, Step, StepAction, StepState, StepTrace};
use leadline_db::repositories::PendingActionRepository;

use crate::effects::EffectCommitter;
use crate::Services;

/// Executes one plan strictly in order. Steps never run in parallel; the
/// first failure or approval gate halts everything after it.
pub struct StepRunner {
    services: Arc<Services>,
    committer: EffectCommitter,
    intake: IntakeAgent,
    quote: QuoteAgent,
    schedule: ScheduleAgent,
    reviews: ReviewAgent,
}

/// Outcome of resolving one step through its agent executor: either a fully
/// replayable payload to commit (or gate), or a direct facade call with no
/// approval surface.
enum Resolution {
    Payload(ActionPayload),
    CaptureLead(NewLead),
}

impl StepRunner {
    pub fn new(services: Arc<Services>) -> Self {
        let llm = services.llm.clone();
        Self {
            committer: EffectCommitter::new(services.clone()),
            intake: IntakeAgent::new(llm.clone()),
            quote: QuoteAgent::new(llm.clone()),
            schedule: ScheduleAgent::new(llm.clone()),
            reviews: ReviewAgent::new(llm),
            services,
        }
    }

    pub async fn run(
        &self,
        plan: &Plan,
        event: &Event,
        mut conversation: Conversation,
        snapshot: &ContextSnapshot,
        audit_ctx: &AuditContext,
    ) -> PlanOutcome {
        let mut trace = Vec::new();

        for step in &plan.steps {
            let resolution = self.resolve(step, event, snapshot).await;

            match resolution {
                Resolution::Payload(payload) => {
                    if step.requires_approval {
                        match self.suspend(step, &conversation, payload, audit_ctx).await {
                            Ok(action_id) => {
                                trace.push(step_trace(step, StepState::Suspended, None));
                                return PlanOutcome::suspended(plan, trace, action_id);
                            }
                            Err(error) => {
                                return self
                                    .fail(plan, step, trace, error, audit_ctx)
                                    .await;
                            }
                        }
                    }

                    let action_type = action_type_for(step, &payload);
                    match self.committer.commit(&mut conversation, &payload, action_type).await {
                        Ok(_) => {
                            self.services.metrics.record(
                                "steps.completed",
                                1.0,
                                &[("action", step.action.kind())],
                            );
                            trace.push(step_trace(step, StepState::Succeeded, None));
                        }
                        Err(error) => {
                            return self.fail(plan, step, trace, error, audit_ctx).await;
                        }
                    }
                }
                Resolution::CaptureLead(lead) => {
                    match self.capture_lead(lead).await {
                        Ok(()) => {
                            self.services.metrics.record(
                                "steps.completed",
                                1.0,
                                &[("action", step.action.kind())],
                            );
                            trace.push(step_trace(step, StepState::Succeeded, None));
                        }
                        Err(error) => {
                            return self.fail(plan, step, trace, error, audit_ctx).await;
                        }
                    }
                }
            }
        }

        PlanOutcome::completed(plan, trace)
    }

    /// Agent executors are pure content producers; provider problems were
    /// already absorbed by the adapters' deterministic fallbacks, so
    /// resolution itself cannot fail.
    async fn resolve(&self, step: &Step, event: &Event, snapshot: &ContextSnapshot) -> Resolution {
        match &step.action {
            StepAction::SendReply { to } => {
                let draft = self.intake.draft_reply(event.event_type, snapshot).await;
                Resolution::Payload(ActionPayload::SendMessage {
                    to: to.clone(),
                    body: draft.reply,
                })
            }
            StepAction::SendQuote { to, service_hint } => {
                let draft = self.quote.draft_quote(service_hint.as_deref(), snapshot).await;
                Resolution::Payload(ActionPayload::SendQuote {
                    to: to.clone(),
                    body: draft.message,
                    price: draft.price,
                    service_type: draft.service_type,
                })
            }
            StepAction::CreateLead { name, phone, requested_service, notes } => {
                Resolution::CaptureLead(NewLead {
                    name: name.clone(),
                    phone: phone.clone(),
                    requested_service: requested_service.clone(),
                    notes: notes.clone(),
                })
            }
            StepAction::BookJob { name, phone, requested_service } => {
                let slots =
                    offered_slots(Utc::now(), self.services.business.scheduling_window_days);
                let draft =
                    self.schedule.draft_schedule(name, requested_service, &slots, snapshot).await;

                if draft.can_schedule {
                    Resolution::Payload(ActionPayload::BookJob {
                        customer_name: name.clone(),
                        customer_phone: phone.clone(),
                        service_type: requested_service.clone(),
                        scheduled_date: slots
                            .get(draft.proposed_date_index)
                            .cloned()
                            .unwrap_or_default(),
                        estimated_price: None,
                        confirmation_body: draft.suggested_message,
                    })
                } else {
                    // Nothing bookable: degrade to the drafted outreach text.
                    Resolution::Payload(ActionPayload::SendMessage {
                        to: phone.clone(),
                        body: draft.suggested_message,
                    })
                }
            }
            StepAction::RequestReview { to, .. } => {
                let draft = self.reviews.draft_review_request(snapshot).await;
                Resolution::Payload(ActionPayload::SendMessage {
                    to: to.clone(),
                    body: draft.message,
                })
            }
        }
    }

    /// Durable pause point: the fully resolved payload goes into the
    /// pending_action row, and nothing after this step runs until an
    /// operator resolves it through a fresh invocation.
    async fn suspend(
        &self,
        step: &Step,
        conversation: &Conversation,
        payload: ActionPayload,
        audit_ctx: &AuditContext,
    ) -> Result<PendingActionId, OrchestrationError> {
        let action = PendingAction {
            id: PendingActionId(Uuid::new_v4().to_string()),
            conversation_id: conversation.id.clone(),
            action_type: action_type_for(step, &payload),
            description: describe(&payload),
            payload,
            status: leadline_core::domain::action::ActionStatus::Pending,
            resolved_at: None,
            resolved_by: None,
            notes: None,
            created_at: Utc::now(),
        };
        let action_id = action.id.clone();

        self.services
            .actions
            .create(action)
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;

        self.services
            .audit(
                AuditEvent::from_context(
                    audit_ctx,
                    "orchestration.stopped",
                    AuditCategory::Execution,
                    AuditOutcome::Success,
                )
                .with_metadata("step_id", step.step_id.0.clone())
                .with_metadata("action", step.action.kind())
                .with_metadata("pending_action_id", action_id.0.clone()),
            )
            .await;
        self.services.metrics.record("plans.suspended", 1.0, &[("action", step.action.kind())]);

        tracing::info!(
            event_name = "orchestration.stopped",
            correlation_id = %audit_ctx.correlation_id,
            pending_action_id = %action_id.0,
            step_id = %step.step_id.0,
            "plan suspended for approval"
        );

        Ok(action_id)
    }

    async fn capture_lead(&self, lead: NewLead) -> Result<(), OrchestrationError> {
        self.services.fsm.create_lead(lead).await.map_err(|error| OrchestrationError::Tool {
            operation: "fsm.create_lead".to_owned(),
            message: error.to_string(),
        })?;
        Ok(())
    }

    async fn fail(
        &self,
        plan: &Plan,
        step: &Step,
        mut trace: Vec<StepTrace>,
        error: OrchestrationError,
        audit_ctx: &AuditContext,
    ) -> PlanOutcome {
        let message = error.to_string();
        trace.push(step_trace(step, StepState::Failed, Some(message.clone())));

        self.services
            .audit(
                AuditEvent::from_context(
                    audit_ctx,
                    "orchestration.step_failed",
                    AuditCategory::Execution,
                    AuditOutcome::Failed,
                )
                .with_metadata("step_id", step.step_id.0.clone())
                .with_metadata("action", step.action.kind())
                .with_metadata("error", message.clone()),
            )
            .await;
        self.services.metrics.record("steps.failed", 1.0, &[("action", step.action.kind())]);

        tracing::warn!(
            event_name = "orchestration.step_failed",
            correlation_id = %audit_ctx.correlation_id,
            step_id = %step.step_id.0,
            error = %message,
            "step failed; halting plan"
        );

        PlanOutcome::failed(plan, trace, message)
    }
}

/// Review requests commit through the generic send-message payload but keep
/// their own action type for the ledger.
fn action_type_for(step: &Step, payload: &ActionPayload) -> ActionType {
    match step.action {
        StepAction::RequestReview { .. } => ActionType::RequestReview,
        _ => payload.action_type(),
    }
}

fn step_trace(step: &Step, state: StepState, error: Option<String>) -> StepTrace {
    StepTrace {
        step_id: step.step_id.clone(),
        agent: step.agent,
        action: step.action.kind().to_owned(),
        state,
        error,
    }
}

fn describe(payload: &ActionPayload) -> String {
    match payload {
        ActionPayload::SendMessage { to, .. } => format!("Send drafted message to {to}"),
        ActionPayload::SendQuote { to, price, service_type, .. } => {
            format!("Send {service_type} quote (${price}) to {to}")
        }
        ActionPayload::BookJob { customer_name, service_type, scheduled_date, .. } => {
            format!("Book {service_type} for {customer_name} on {scheduled_date}")
        }
    }
}

/// Offered booking dates: the next `window_days` days starting tomorrow.
fn offered_slots(from: DateTime<Utc>, window_days: u16) -> Vec<String> {
    (1..=i64::from(window_days))
        .map(|offset| (from + Duration::days(offset)).format("%Y-%m-%d").to_string())
        .collect()
}
