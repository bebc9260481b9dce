use std::sync::Arc;

use chrono::Utc;

use leadline_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use leadline_core::domain::action::{ActionStatus, PendingAction, PendingActionId};
use leadline_core::errors::{DomainError, OrchestrationError};
use leadline_core::metrics::MetricsSink;
use leadline_db::repositories::{ConversationRepository, PendingActionRepository, ResolveOutcome};

use crate::effects::EffectCommitter;
use crate::Services;

/// Operator control surface over the pending-action ledger. Resolution is a
/// fresh invocation that replays the stored payload - never a continuation
/// of the suspended plan's call stack, so it survives process restarts
/// between suspension and the operator's decision.
pub struct ApprovalService {
    services: Arc<Services>,
    committer: EffectCommitter,
}

impl ApprovalService {
    pub fn new(services: Arc<Services>) -> Self {
        Self { committer: EffectCommitter::new(services.clone()), services }
    }

    /// Flips pending -> approved under the compare-and-set guard, then
    /// commits the stored payload through the tool facade. Steps after the
    /// suspended one are not resumed; further progress needs a new event.
    pub async fn approve_action(
        &self,
        action_id: &str,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<PendingAction, OrchestrationError> {
        let action = self
            .resolve(action_id, ActionStatus::Approved, resolved_by, notes)
            .await?;

        let mut conversation = self
            .services
            .conversations
            .find_by_id(&action.conversation_id)
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?
            .ok_or_else(|| {
                OrchestrationError::Persistence(format!(
                    "conversation {} for action {} is missing",
                    action.conversation_id.0, action.id.0
                ))
            })?;

        let audit_ctx = AuditContext::new(
            None,
            Some(conversation.id.clone()),
            action.id.0.clone(),
            resolved_by,
        );

        match self
            .committer
            .commit(&mut conversation, &action.payload, action.action_type)
            .await
        {
            Ok(report) => {
                let mut entry = AuditEvent::from_context(
                    &audit_ctx,
                    "approval.approved",
                    AuditCategory::Approval,
                    AuditOutcome::Success,
                )
                .with_metadata("action_type", action.action_type.as_str());
                if let Some(job_id) = report.job_id {
                    entry = entry.with_metadata("job_id", job_id);
                }
                self.services.audit(entry).await;
                self.services.metrics.record(
                    "approvals.approved",
                    1.0,
                    &[("action_type", action.action_type.as_str())],
                );
                Ok(action)
            }
            Err(error) => {
                self.services
                    .audit(
                        AuditEvent::from_context(
                            &audit_ctx,
                            "approval.approved",
                            AuditCategory::Approval,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("action_type", action.action_type.as_str())
                        .with_metadata("error", error.to_string()),
                    )
                    .await;
                Err(error)
            }
        }
    }

    /// Flips pending -> rejected. No side effect is committed; the drafted
    /// payload simply never leaves the ledger.
    pub async fn reject_action(
        &self,
        action_id: &str,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<PendingAction, OrchestrationError> {
        let action = self
            .resolve(action_id, ActionStatus::Rejected, resolved_by, notes)
            .await?;

        self.services
            .audit(
                AuditEvent::new(
                    None,
                    Some(action.conversation_id.clone()),
                    action.id.0.clone(),
                    "approval.rejected",
                    AuditCategory::Approval,
                    resolved_by,
                    AuditOutcome::Rejected,
                )
                .with_metadata("action_type", action.action_type.as_str()),
            )
            .await;
        self.services.metrics.record(
            "approvals.rejected",
            1.0,
            &[("action_type", action.action_type.as_str())],
        );

        Ok(action)
    }

    async fn resolve(
        &self,
        action_id: &str,
        status: ActionStatus,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<PendingAction, OrchestrationError> {
        let id = PendingActionId(action_id.to_owned());
        let outcome = self
            .services
            .actions
            .resolve(&id, status, resolved_by, notes.as_deref(), Utc::now())
            .await
            .map_err(|error| OrchestrationError::Persistence(error.to_string()))?;

        match outcome {
            ResolveOutcome::Resolved(action) => Ok(action),
            ResolveOutcome::AlreadyResolved(status) => {
                Err(OrchestrationError::Domain(DomainError::ActionAlreadyResolved { id, status }))
            }
            ResolveOutcome::NotFound => {
                Err(OrchestrationError::Domain(DomainError::ActionNotFound(id)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use leadline_core::domain::action::{ActionStatus, ActionType};
    use leadline_core::domain::conversation::ConversationStatus;
    use leadline_core::domain::event::EventPayload;
    use leadline_core::errors::{DomainError, OrchestrationError};
    use leadline_core::policy::PlannerPolicy;
    use leadline_db::repositories::{ConversationRepository, JobRepository};

    use crate::approvals::ApprovalService;
    use crate::intake::{EventIntake, EventRequest};
    use crate::testkit::TestHarness;

    async fn suspend_quote(harness: &TestHarness) -> String {
        let intake = EventIntake::new(harness.services.clone());
        let outcome = intake
            .handle_event(EventRequest {
                payload: EventPayload::InboundSms {
                    phone: "+15550100".to_owned(),
                    body: "How much for gutter cleaning?".to_owned(),
                },
                event_id: Some("evt-quote".to_owned()),
            })
            .await
            .expect("handle event");

        assert!(outcome.stopped_for_approval);
        let pending = harness.pending_actions().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action_type, ActionType::SendQuote);
        pending[0].id.0.clone()
    }

    #[tokio::test]
    async fn approving_a_quote_replays_the_stored_draft_exactly_once() {
        let harness =
            TestHarness::new(PlannerPolicy { auto_quote_enabled: false, ..Default::default() });
        let action_id = suspend_quote(&harness).await;

        // Only the intake reply went out while the quote was gated.
        assert_eq!(harness.sms.sent().len(), 1);

        let approvals = ApprovalService::new(harness.services.clone());
        let action = approvals
            .approve_action(&action_id, "operator:dana", Some("price confirmed".to_owned()))
            .await
            .expect("approve");

        assert_eq!(action.status, ActionStatus::Approved);

        let sent = harness.sms.sent();
        assert_eq!(sent.len(), 2);
        // The replayed message is the stored draft, not a fresh agent call.
        assert!(sent[1].body.contains("gutter cleaning"));

        let conversation = harness
            .services
            .conversations
            .find_by_id(&action.conversation_id)
            .await
            .expect("query")
            .expect("exists");
        assert_eq!(conversation.status, ConversationStatus::Qualified);
    }

    #[tokio::test]
    async fn second_resolution_fails_with_already_resolved_and_no_side_effect() {
        let harness =
            TestHarness::new(PlannerPolicy { auto_quote_enabled: false, ..Default::default() });
        let action_id = suspend_quote(&harness).await;

        let approvals = ApprovalService::new(harness.services.clone());
        approvals.approve_action(&action_id, "operator:dana", None).await.expect("approve");
        let sends_after_approval = harness.sms.sent().len();

        let error = approvals
            .reject_action(&action_id, "operator:kim", None)
            .await
            .expect_err("second resolution must fail");

        assert!(matches!(
            error,
            OrchestrationError::Domain(DomainError::ActionAlreadyResolved {
                status: ActionStatus::Approved,
                ..
            })
        ));
        assert_eq!(harness.sms.sent().len(), sends_after_approval);
    }

    #[tokio::test]
    async fn rejecting_commits_nothing() {
        let harness =
            TestHarness::new(PlannerPolicy { auto_quote_enabled: false, ..Default::default() });
        let action_id = suspend_quote(&harness).await;

        let approvals = ApprovalService::new(harness.services.clone());
        let action = approvals
            .reject_action(&action_id, "operator:dana", Some("price too low".to_owned()))
            .await
            .expect("reject");

        assert_eq!(action.status, ActionStatus::Rejected);
        // Still just the original intake reply.
        assert_eq!(harness.sms.sent().len(), 1);
        assert!(harness.pending_actions().await.is_empty());
    }

    #[tokio::test]
    async fn resolving_an_unknown_action_reports_not_found() {
        let harness = TestHarness::new(PlannerPolicy::default());
        let approvals = ApprovalService::new(harness.services.clone());

        let error = approvals
            .approve_action("missing-action", "operator:dana", None)
            .await
            .expect_err("unknown id must fail");
        assert!(matches!(
            error,
            OrchestrationError::Domain(DomainError::ActionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn gated_booking_creates_no_job_until_approved() {
        let harness = TestHarness::new(PlannerPolicy {
            approvals_required_for_booking: true,
            ..Default::default()
        });
        let intake = EventIntake::new(harness.services.clone());

        let outcome = intake
            .handle_event(EventRequest {
                payload: EventPayload::WebLead {
                    phone: "+15550100".to_owned(),
                    name: "Dana R".to_owned(),
                    requested_service: "lawn care".to_owned(),
                    notes: None,
                },
                event_id: Some("evt-lead".to_owned()),
            })
            .await
            .expect("handle event");

        assert!(outcome.stopped_for_approval);
        let pending = harness.pending_actions().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action_type, ActionType::BookJob);
        assert!(harness.fsm.jobs().is_empty());

        let approvals = ApprovalService::new(harness.services.clone());
        let action = approvals
            .approve_action(&pending[0].id.0, "operator:dana", None)
            .await
            .expect("approve booking");

        assert_eq!(harness.fsm.jobs().len(), 1);
        let jobs = harness
            .services
            .jobs
            .list_for_conversation(&action.conversation_id)
            .await
            .expect("jobs");
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].fsm_ref.is_some());

        let conversation = harness
            .services
            .conversations
            .find_by_id(&action.conversation_id)
            .await
            .expect("query")
            .expect("exists");
        assert_eq!(conversation.status, ConversationStatus::Scheduled);
    }
}
