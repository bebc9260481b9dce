use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use leadline_comms::{FsmClient, NewFsmJob, SmsDelivery};
use leadline_core::domain::action::{ActionPayload, ActionType};
use leadline_core::domain::conversation::{
    Conversation, ConversationStatus, Message, MessageId, MessageRole,
};
use leadline_core::domain::job::{Job, JobId, JobStatus};
use leadline_core::errors::OrchestrationError;
use leadline_core::metrics::MetricsSink;
use leadline_db::repositories::{ConversationRepository, JobRepository, MessageRepository};

use crate::Services;

/// What a committed payload produced, for audit metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CommitReport {
    pub sent_message: bool,
    pub job_id: Option<String>,
    pub fsm_ref: Option<String>,
}

/// The single commit path for resolved action payloads. The step runner uses
/// it for unapproved steps; approval resolution replays stored payloads
/// through the very same code, so a payload behaves identically whether it
/// was committed immediately or days later after a restart.
pub(crate) struct EffectCommitter {
    services: Arc<Services>,
}

impl EffectCommitter {
    pub(crate) fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    pub(crate) async fn commit(
        &self,
        conversation: &mut Conversation,
        payload: &ActionPayload,
        action_type: ActionType,
    ) -> Result<CommitReport, OrchestrationError> {
        let mut report = CommitReport::default();

        match payload {
            ActionPayload::SendMessage { to, body } => {
                self.send_and_record(conversation, to, body).await?;
                report.sent_message = true;
            }
            ActionPayload::SendQuote { to, body, .. } => {
                self.send_and_record(conversation, to, body).await?;
                report.sent_message = true;
                self.advance_conversation(conversation, ConversationStatus::Qualified).await?;
                self.services.metrics.record("quotes.sent", 1.0, &[]);
            }
            ActionPayload::BookJob {
                customer_name,
                customer_phone,
                service_type,
                scheduled_date,
                estimated_price,
                confirmation_body,
            } => {
                let fsm_ref = self
                    .services
                    .fsm
                    .create_job(NewFsmJob {
                        customer_name: customer_name.clone(),
                        customer_phone: customer_phone.clone(),
                        service_type: service_type.clone(),
                        scheduled_date: scheduled_date.clone(),
                        estimated_price: *estimated_price,
                    })
                    .await
                    .map_err(|error| OrchestrationError::Tool {
                        operation: "fsm.create_job".to_owned(),
                        message: error.to_string(),
                    })?;

                let job = Job {
                    id: JobId(Uuid::new_v4().to_string()),
                    conversation_id: conversation.id.clone(),
                    customer_name: customer_name.clone(),
                    customer_phone: customer_phone.clone(),
                    service_type: service_type.clone(),
                    scheduled_date: scheduled_date.clone(),
                    estimated_price: *estimated_price,
                    fsm_ref: Some(fsm_ref.0.clone()),
                    status: JobStatus::Scheduled,
                    created_at: Utc::now(),
                };
                report.job_id = Some(job.id.0.clone());
                report.fsm_ref = Some(fsm_ref.0);
                self.services
                    .jobs
                    .create(job)
                    .await
                    .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;

                self.send_and_record(conversation, customer_phone, confirmation_body).await?;
                report.sent_message = true;
                self.advance_conversation(conversation, ConversationStatus::Scheduled).await?;
                self.services.metrics.record("jobs.booked", 1.0, &[]);
            }
        }

        if action_type == ActionType::RequestReview {
            self.advance_conversation(conversation, ConversationStatus::Completed).await?;
            self.services.metrics.record("reviews.sent", 1.0, &[]);
        }

        Ok(report)
    }

    async fn send_and_record(
        &self,
        conversation: &Conversation,
        to: &str,
        body: &str,
    ) -> Result<(), OrchestrationError> {
        self.services.sms.send_sms(to, body).await.map_err(|error| OrchestrationError::Tool {
            operation: "sms.send".to_owned(),
            message: error.to_string(),
        })?;

        self.services
            .messages
            .append(Message {
                id: MessageId(Uuid::new_v4().to_string()),
                conversation_id: conversation.id.clone(),
                role: MessageRole::Ai,
                content: body.to_owned(),
                created_at: Utc::now(),
            })
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;

        Ok(())
    }

    /// Status changes follow the conversation lifecycle; a payload replayed
    /// against a conversation that already moved on leaves it untouched.
    async fn advance_conversation(
        &self,
        conversation: &mut Conversation,
        target: ConversationStatus,
    ) -> Result<(), OrchestrationError> {
        if conversation.status == target || !conversation.can_transition_to(target) {
            return Ok(());
        }

        conversation.transition_to(target)?;
        conversation.updated_at = Utc::now();
        self.services
            .conversations
            .update(conversation.clone())
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;
        Ok(())
    }
}
