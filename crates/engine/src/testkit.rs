//! Shared fixtures for engine module tests: in-memory repositories,
//! recording tool facades, and a scripted provider that defaults to
//! deterministic adapter fallbacks.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use leadline_agent::ScriptedLlmClient;
use leadline_comms::{RecordingFsmClient, RecordingSmsDelivery};
use leadline_core::config::BusinessProfile;
use leadline_core::context::ContextSnapshot;
use leadline_core::domain::action::{PendingAction, PendingActionId};
use leadline_core::domain::conversation::{Conversation, ConversationId, ConversationStatus};
use leadline_core::domain::event::{Event, EventId, EventPayload, EventStatus};
use leadline_core::metrics::InMemoryMetricsSink;
use leadline_core::policy::PlannerPolicy;
use leadline_db::repositories::{
    ConversationRepository, InMemoryAuditLogRepository, InMemoryConversationRepository,
    InMemoryEventReceiptRepository, InMemoryEventRepository, InMemoryJobRepository,
    InMemoryMessageRepository, InMemoryPendingActionRepository, PendingActionRepository,
};

use crate::context::ContextBuilder;
use crate::Services;

pub(crate) struct TestHarness {
    pub services: Arc<Services>,
    pub sms: Arc<RecordingSmsDelivery>,
    pub fsm: Arc<RecordingFsmClient>,
    pub llm: Arc<ScriptedLlmClient>,
    pub metrics: InMemoryMetricsSink,
    pub events: Arc<InMemoryEventRepository>,
    pub receipts: Arc<InMemoryEventReceiptRepository>,
    pub actions: Arc<InMemoryPendingActionRepository>,
    pub audit_entries: Arc<InMemoryAuditLogRepository>,
}

impl TestHarness {
    pub fn new(policy: PlannerPolicy) -> Self {
        let sms = Arc::new(RecordingSmsDelivery::default());
        let fsm = Arc::new(RecordingFsmClient::default());
        let llm = Arc::new(ScriptedLlmClient::default());
        let metrics = InMemoryMetricsSink::default();
        let events = Arc::new(InMemoryEventRepository::default());
        let receipts = Arc::new(InMemoryEventReceiptRepository::default());
        let actions = Arc::new(InMemoryPendingActionRepository::default());
        let audit_entries = Arc::new(InMemoryAuditLogRepository::default());

        let services = Arc::new(Services {
            events: events.clone(),
            receipts: receipts.clone(),
            conversations: Arc::new(InMemoryConversationRepository::default()),
            messages: Arc::new(InMemoryMessageRepository::default()),
            actions: actions.clone(),
            jobs: Arc::new(InMemoryJobRepository::default()),
            audit_log: audit_entries.clone(),
            sms: sms.clone(),
            fsm: fsm.clone(),
            metrics: Arc::new(metrics.clone()),
            llm: llm.clone(),
            business: business_profile(),
            policy,
        });

        Self { services, sms, fsm, llm, metrics, events, receipts, actions, audit_entries }
    }

    pub async fn insert_conversation(&self, phone: &str) -> Conversation {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId(Uuid::new_v4().to_string()),
            customer_phone: phone.to_owned(),
            customer_name: None,
            source: leadline_core::domain::event::EventType::MissedCall,
            status: ConversationStatus::Active,
            agent_type: "intake".to_owned(),
            created_at: now,
            updated_at: now,
        };
        self.services
            .conversations
            .create(conversation.clone())
            .await
            .expect("insert test conversation");
        conversation
    }

    pub async fn snapshot_for(&self, conversation: &Conversation) -> ContextSnapshot {
        ContextBuilder::new(self.services.clone())
            .build(Some(conversation.clone()))
            .await
            .expect("build snapshot")
    }

    pub async fn pending_action(&self, id: &PendingActionId) -> PendingAction {
        self.actions
            .find_by_id(id)
            .await
            .expect("query pending action")
            .expect("pending action exists")
    }

    pub async fn pending_actions(&self) -> Vec<PendingAction> {
        self.actions
            .list_by_status(leadline_core::domain::action::ActionStatus::Pending, 100)
            .await
            .expect("list pending actions")
    }
}

pub(crate) fn business_profile() -> BusinessProfile {
    BusinessProfile {
        name: "Brightside Exteriors".to_owned(),
        services: vec!["gutter cleaning".to_owned(), "lawn care".to_owned()],
        service_area: "Travis County".to_owned(),
        review_link: Some("https://reviews.example.com/brightside".to_owned()),
        scheduling_window_days: 3,
    }
}

fn event(id: &str, payload: EventPayload) -> Event {
    Event {
        id: EventId(id.to_owned()),
        event_type: payload.event_type(),
        payload,
        status: EventStatus::Processing,
        conversation_id: None,
        error: None,
        created_at: Utc::now(),
        processed_at: None,
    }
}

pub(crate) fn missed_call_event(id: &str, phone: &str) -> Event {
    event(id, EventPayload::MissedCall { phone: phone.to_owned(), caller_name: None })
}

pub(crate) fn inbound_sms_event(id: &str, phone: &str, body: &str) -> Event {
    event(id, EventPayload::InboundSms { phone: phone.to_owned(), body: body.to_owned() })
}

pub(crate) fn web_lead_event(id: &str, phone: &str, name: &str, service: &str) -> Event {
    event(
        id,
        EventPayload::WebLead {
            phone: phone.to_owned(),
            name: name.to_owned(),
            requested_service: service.to_owned(),
            notes: None,
        },
    )
}
