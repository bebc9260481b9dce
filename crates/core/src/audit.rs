use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::conversation::ConversationId;
use crate::domain::event::EventId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Ingress,
    Planning,
    Execution,
    Approval,
    Persistence,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub event_id: Option<EventId>,
    pub conversation_id: Option<ConversationId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        event_id: Option<EventId>,
        conversation_id: Option<ConversationId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            event_id,
            conversation_id,
            correlation_id: correlation_id.into(),
            actor: actor.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub entry_id: String,
    pub event_id: Option<EventId>,
    pub conversation_id: Option<ConversationId>,
    pub correlation_id: String,
    pub action: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_id: Option<EventId>,
        conversation_id: Option<ConversationId>,
        correlation_id: impl Into<String>,
        action: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            event_id,
            conversation_id,
            correlation_id: correlation_id.into(),
            action: action.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn from_context(
        context: &AuditContext,
        action: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self::new(
            context.event_id.clone(),
            context.conversation_id.clone(),
            context.correlation_id.clone(),
            action,
            category,
            context.actor.clone(),
            outcome,
        )
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome},
        domain::{conversation::ConversationId, event::EventId},
    };

    #[test]
    fn entries_carry_correlation_fields_and_metadata() {
        let entry = AuditEvent::new(
            Some(EventId("evt-42".to_owned())),
            Some(ConversationId("conv-9".to_owned())),
            "req-123",
            "orchestration.stopped",
            AuditCategory::Execution,
            "step-runner",
            AuditOutcome::Success,
        )
        .with_metadata("step", "send_quote")
        .with_metadata("pending_action", "act-1");

        assert_eq!(entry.correlation_id, "req-123");
        assert_eq!(entry.event_id.as_ref().map(|id| id.0.as_str()), Some("evt-42"));
        assert_eq!(entry.conversation_id.as_ref().map(|id| id.0.as_str()), Some("conv-9"));
        assert!(entry.metadata.contains_key("pending_action"));
    }

    #[test]
    fn from_context_copies_every_correlation_field() {
        let context = AuditContext::new(
            Some(EventId("evt-1".to_owned())),
            None,
            "req-7",
            "event-intake",
        );
        let entry = AuditEvent::from_context(
            &context,
            "event.received",
            AuditCategory::Ingress,
            AuditOutcome::Success,
        );

        assert_eq!(entry.event_id, context.event_id);
        assert_eq!(entry.correlation_id, "req-7");
        assert_eq!(entry.actor, "event-intake");
        assert!(entry.conversation_id.is_none());
    }
}
