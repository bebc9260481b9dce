use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use leadline_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use leadline_core::domain::conversation::{
    Conversation, ConversationId, ConversationStatus, Message, MessageId, MessageRole,
};
use leadline_core::domain::event::{
    Event, EventId, EventPayload, EventReceipt, EventStatus, EventType, ReceiptStatus,
};
use leadline_core::domain::job::JobId;
use leadline_core::errors::OrchestrationError;
use leadline_core::metrics::MetricsSink;
use leadline_core::plan::PlanState;
use leadline_core::planner;
use leadline_db::repositories::{
    ConversationRepository, EventReceiptRepository, EventRepository, JobRepository,
    MessageRepository,
};

use crate::context::ContextBuilder;
use crate::runner::StepRunner;
use crate::Services;

/// A receipt stuck in `processing` longer than this is treated as an
/// abandoned invocation (crashed process, store outage mid-run) and the
/// retry is allowed to take over.
const IN_FLIGHT_RETRY_AFTER_SECS: i64 = 300;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRequest {
    pub payload: EventPayload,
    pub event_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandleEventOutcome {
    pub success: bool,
    pub message: String,
    pub conversation_id: Option<ConversationId>,
    pub event_id: EventId,
    pub stopped_for_approval: bool,
}

enum IngressDecision {
    Fresh,
    Resume,
    ShortCircuit(HandleEventOutcome),
}

/// Entry point for every inbound event. Owns idempotency and drives context
/// building, planning, and the step runner.
pub struct EventIntake {
    services: Arc<Services>,
    context: ContextBuilder,
    runner: StepRunner,
}

impl EventIntake {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            context: ContextBuilder::new(services.clone()),
            runner: StepRunner::new(services.clone()),
            services,
        }
    }

    pub async fn handle_event(
        &self,
        request: EventRequest,
    ) -> Result<HandleEventOutcome, OrchestrationError> {
        // Fails fast: no receipt, no event record, no side effects.
        request.payload.validate()?;

        let event_id = EventId(
            request
                .event_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        );
        let event_type = request.payload.event_type();

        match self.begin_ingress(&event_id).await? {
            IngressDecision::ShortCircuit(outcome) => return Ok(outcome),
            IngressDecision::Fresh | IngressDecision::Resume => {}
        }

        let event = self.ensure_event_record(&event_id, event_type, &request.payload).await?;

        let audit_ctx = AuditContext::new(
            Some(event_id.clone()),
            None,
            event_id.0.clone(),
            "event-intake",
        );
        self.services
            .audit(
                AuditEvent::from_context(
                    &audit_ctx,
                    "event.received",
                    AuditCategory::Ingress,
                    AuditOutcome::Success,
                )
                .with_metadata("event_type", event_type.as_str()),
            )
            .await;
        self.services.metrics.record(
            "events.received",
            1.0,
            &[("event_type", event_type.as_str())],
        );

        let conversation = self.ensure_conversation(&request.payload).await?;
        if let Some(conversation) = &conversation {
            self.append_inbound_message(conversation, &request.payload).await?;
        }

        let audit_ctx = AuditContext::new(
            Some(event_id.clone()),
            conversation.as_ref().map(|c| c.id.clone()),
            event_id.0.clone(),
            "event-intake",
        );

        let snapshot = self.context.build(conversation.clone()).await?;
        let plan = planner::plan(&event, &snapshot, &self.services.policy);

        self.services
            .audit(
                AuditEvent::from_context(
                    &audit_ctx,
                    "orchestration.started",
                    AuditCategory::Planning,
                    AuditOutcome::Success,
                )
                .with_metadata("plan_id", plan.plan_id.0.clone())
                .with_metadata("steps", plan.steps.len().to_string())
                .with_metadata("policy_version", self.services.policy.version.to_string()),
            )
            .await;

        let conversation_id = conversation.as_ref().map(|c| c.id.clone());
        if plan.is_empty() {
            self.finalize_completed(&event_id, conversation_id.as_ref(), "no actions planned", &audit_ctx)
                .await;
            return Ok(HandleEventOutcome {
                success: true,
                message: "no actions planned".to_owned(),
                conversation_id,
                event_id,
                stopped_for_approval: false,
            });
        }

        let Some(conversation) = conversation else {
            // Planner only emits steps when it has a recipient, so an empty
            // plan already covered the no-conversation case.
            self.finalize_completed(&event_id, None, "no actions planned", &audit_ctx).await;
            return Ok(HandleEventOutcome {
                success: true,
                message: "no actions planned".to_owned(),
                conversation_id: None,
                event_id,
                stopped_for_approval: false,
            });
        };

        let outcome = self.runner.run(&plan, &event, conversation, &snapshot, &audit_ctx).await;

        match outcome.state {
            PlanState::Completed => {
                self.finalize_completed(
                    &event_id,
                    conversation_id.as_ref(),
                    "plan completed",
                    &audit_ctx,
                )
                .await;
                Ok(HandleEventOutcome {
                    success: true,
                    message: format!("completed {} steps", outcome.trace.len()),
                    conversation_id,
                    event_id,
                    stopped_for_approval: false,
                })
            }
            PlanState::Suspended => {
                let action_id = outcome
                    .pending_action_id
                    .as_ref()
                    .map(|id| id.0.clone())
                    .unwrap_or_default();
                // Intake is done: the pause point is durable and resolution
                // arrives through a separate entry point.
                self.finalize_completed(
                    &event_id,
                    conversation_id.as_ref(),
                    &format!("stopped_for_approval:{action_id}"),
                    &audit_ctx,
                )
                .await;
                Ok(HandleEventOutcome {
                    success: true,
                    message: "stopped for approval".to_owned(),
                    conversation_id,
                    event_id,
                    stopped_for_approval: true,
                })
            }
            PlanState::Failed => {
                let error = outcome.error.clone().unwrap_or_else(|| "step failed".to_owned());
                self.finalize_failed(&event_id, conversation_id.as_ref(), &error, &audit_ctx).await;
                Ok(HandleEventOutcome {
                    success: false,
                    message: error,
                    conversation_id,
                    event_id,
                    stopped_for_approval: false,
                })
            }
            PlanState::Running => {
                // The runner always returns a terminal plan state.
                let error = "plan runner returned a non-terminal state".to_owned();
                self.finalize_failed(&event_id, conversation_id.as_ref(), &error, &audit_ctx).await;
                Err(OrchestrationError::Domain(
                    leadline_core::errors::DomainError::InvariantViolation(error),
                ))
            }
        }
    }

    /// Receipt gate. Exactly one invocation may own a fresh event id; replays
    /// of terminal events short-circuit with the stored result.
    async fn begin_ingress(
        &self,
        event_id: &EventId,
    ) -> Result<IngressDecision, OrchestrationError> {
        let existing = self
            .services
            .receipts
            .find_by_event_id(event_id)
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;

        if let Some(receipt) = existing {
            return Ok(match receipt.status {
                ReceiptStatus::Completed | ReceiptStatus::Failed => {
                    IngressDecision::ShortCircuit(self.replay_outcome(event_id, &receipt).await?)
                }
                ReceiptStatus::Processing => {
                    let age = Utc::now() - receipt.created_at;
                    if age > Duration::seconds(IN_FLIGHT_RETRY_AFTER_SECS) {
                        tracing::warn!(
                            event_name = "ingress.event.stale_takeover",
                            event_id = %event_id.0,
                            "receipt stuck in processing; retry is taking over"
                        );
                        IngressDecision::Resume
                    } else {
                        IngressDecision::ShortCircuit(HandleEventOutcome {
                            success: true,
                            message: "event is already being processed".to_owned(),
                            conversation_id: None,
                            event_id: event_id.clone(),
                            stopped_for_approval: false,
                        })
                    }
                }
            });
        }

        let inserted = self
            .services
            .receipts
            .try_begin(EventReceipt::processing(event_id.clone(), Utc::now()))
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;

        if inserted {
            Ok(IngressDecision::Fresh)
        } else {
            // Lost the uniqueness race to a concurrent delivery.
            Ok(IngressDecision::ShortCircuit(HandleEventOutcome {
                success: true,
                message: "event is already being processed".to_owned(),
                conversation_id: None,
                event_id: event_id.clone(),
                stopped_for_approval: false,
            }))
        }
    }

    async fn replay_outcome(
        &self,
        event_id: &EventId,
        receipt: &EventReceipt,
    ) -> Result<HandleEventOutcome, OrchestrationError> {
        let event = self
            .services
            .events
            .find_by_id(event_id)
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;

        let stopped_for_approval = receipt
            .result
            .as_deref()
            .is_some_and(|result| result.starts_with("stopped_for_approval:"));

        Ok(HandleEventOutcome {
            success: true,
            message: "event already processed".to_owned(),
            conversation_id: event.and_then(|event| event.conversation_id),
            event_id: event_id.clone(),
            stopped_for_approval,
        })
    }

    async fn ensure_event_record(
        &self,
        event_id: &EventId,
        event_type: EventType,
        payload: &EventPayload,
    ) -> Result<Event, OrchestrationError> {
        let existing = self
            .services
            .events
            .find_by_id(event_id)
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;
        if let Some(event) = existing {
            return Ok(event);
        }

        let event = Event {
            id: event_id.clone(),
            event_type,
            payload: payload.clone(),
            status: EventStatus::Processing,
            conversation_id: None,
            error: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.services
            .events
            .create(event.clone())
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;
        Ok(event)
    }

    async fn ensure_conversation(
        &self,
        payload: &EventPayload,
    ) -> Result<Option<Conversation>, OrchestrationError> {
        if let Some(phone) = payload.phone() {
            if let Some(mut existing) = self
                .services
                .conversations
                .find_by_phone(phone)
                .await
                .map_err(|error| OrchestrationError::Persistence(error.to_string()))?
            {
                if existing.customer_name.is_none() {
                    if let Some(name) = payload_customer_name(payload) {
                        existing.customer_name = Some(name.to_owned());
                        existing.updated_at = Utc::now();
                        self.services
                            .conversations
                            .update(existing.clone())
                            .await
                            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;
                    }
                }
                return Ok(Some(existing));
            }

            let now = Utc::now();
            let conversation = Conversation {
                id: ConversationId(Uuid::new_v4().to_string()),
                customer_phone: phone.to_owned(),
                customer_name: payload_customer_name(payload).map(str::to_owned),
                source: payload.event_type(),
                status: ConversationStatus::Active,
                agent_type: agent_type_for(payload.event_type()).to_owned(),
                created_at: now,
                updated_at: now,
            };

            return match self.services.conversations.create(conversation.clone()).await {
                Ok(()) => Ok(Some(conversation)),
                // The phone uniqueness constraint lost a race; the winning
                // row is the conversation.
                Err(_) => self
                    .services
                    .conversations
                    .find_by_phone(phone)
                    .await
                    .map_err(|error| OrchestrationError::Persistence(error.to_string())),
            };
        }

        if let EventPayload::JobCompleted { job_id, .. } = payload {
            let job = self
                .services
                .jobs
                .find_by_id(&JobId(job_id.clone()))
                .await
                .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;
            if let Some(job) = job {
                return self
                    .services
                    .conversations
                    .find_by_id(&job.conversation_id)
                    .await
                    .map_err(|error| OrchestrationError::Persistence(error.to_string()));
            }
        }

        Ok(None)
    }

    async fn append_inbound_message(
        &self,
        conversation: &Conversation,
        payload: &EventPayload,
    ) -> Result<(), OrchestrationError> {
        let (role, content) = match payload {
            EventPayload::MissedCall { phone, .. } => {
                (MessageRole::System, format!("Missed call from {phone}"))
            }
            EventPayload::InboundSms { body, .. } => (MessageRole::Customer, body.clone()),
            EventPayload::WebLead { requested_service, notes, .. } => (
                MessageRole::System,
                match notes {
                    Some(notes) => format!("Web lead requesting {requested_service}: {notes}"),
                    None => format!("Web lead requesting {requested_service}"),
                },
            ),
            EventPayload::JobCompleted { job_id, .. } => {
                (MessageRole::System, format!("Job {job_id} completed"))
            }
        };

        self.services
            .messages
            .append(Message {
                id: MessageId(Uuid::new_v4().to_string()),
                conversation_id: conversation.id.clone(),
                role,
                content,
                created_at: Utc::now(),
            })
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))
    }

    async fn finalize_completed(
        &self,
        event_id: &EventId,
        conversation_id: Option<&ConversationId>,
        result: &str,
        audit_ctx: &AuditContext,
    ) {
        let now = Utc::now();
        if let Err(error) = self
            .services
            .events
            .mark_terminal(event_id, EventStatus::Completed, None, conversation_id, now)
            .await
        {
            tracing::warn!(
                event_name = "ingress.event.finalize_failed",
                event_id = %event_id.0,
                error = %error,
                "event row could not be marked completed"
            );
        }
        if let Err(error) = self
            .services
            .receipts
            .mark_terminal(event_id, ReceiptStatus::Completed, Some(result), now)
            .await
        {
            tracing::warn!(
                event_name = "ingress.receipt.finalize_failed",
                event_id = %event_id.0,
                error = %error,
                "receipt could not be marked completed; stale takeover will retry it"
            );
        }

        self.services
            .audit(AuditEvent::from_context(
                audit_ctx,
                "orchestration.completed",
                AuditCategory::Execution,
                AuditOutcome::Success,
            ))
            .await;
        self.services.metrics.record("events.processed", 1.0, &[]);
    }

    async fn finalize_failed(
        &self,
        event_id: &EventId,
        conversation_id: Option<&ConversationId>,
        error: &str,
        audit_ctx: &AuditContext,
    ) {
        let now = Utc::now();
        if let Err(mark_error) = self
            .services
            .events
            .mark_terminal(event_id, EventStatus::Failed, Some(error), conversation_id, now)
            .await
        {
            tracing::warn!(
                event_name = "ingress.event.finalize_failed",
                event_id = %event_id.0,
                error = %mark_error,
                "event row could not be marked failed"
            );
        }
        if let Err(mark_error) = self
            .services
            .receipts
            .mark_terminal(event_id, ReceiptStatus::Failed, Some(error), now)
            .await
        {
            tracing::warn!(
                event_name = "ingress.receipt.finalize_failed",
                event_id = %event_id.0,
                error = %mark_error,
                "receipt could not be marked failed; stale takeover will retry it"
            );
        }

        self.services
            .audit(
                AuditEvent::from_context(
                    audit_ctx,
                    "orchestration.error",
                    AuditCategory::Execution,
                    AuditOutcome::Failed,
                )
                .with_metadata("error", error),
            )
            .await;
        self.services.metrics.record("events.failed", 1.0, &[]);
    }
}

fn payload_customer_name(payload: &EventPayload) -> Option<&str> {
    match payload {
        EventPayload::MissedCall { caller_name, .. } => caller_name.as_deref(),
        EventPayload::WebLead { name, .. } => Some(name.as_str()),
        EventPayload::InboundSms { .. } | EventPayload::JobCompleted { .. } => None,
    }
}

fn agent_type_for(event_type: EventType) -> &'static str {
    match event_type {
        EventType::MissedCall | EventType::InboundSms | EventType::WebLead => "intake",
        EventType::JobCompleted => "reviews",
    }
}
