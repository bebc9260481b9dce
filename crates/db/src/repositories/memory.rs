use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use leadline_core::audit::AuditEvent;
use leadline_core::domain::action::{ActionStatus, PendingAction, PendingActionId};
use leadline_core::domain::conversation::{Conversation, ConversationId, Message};
use leadline_core::domain::event::{Event, EventId, EventReceipt, EventStatus, ReceiptStatus};
use leadline_core::domain::job::{Job, JobId};

use super::{
    AuditLogRepository, ConversationRepository, EventReceiptRepository, EventRepository,
    JobRepository, MessageRepository, PendingActionRepository, RepositoryError, ResolveOutcome,
};

#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<HashMap<String, Event>>,
}

#[async_trait::async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn find_by_id(&self, id: &EventId) -> Result<Option<Event>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.get(&id.0).cloned())
    }

    async fn create(&self, event: Event) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        events.insert(event.id.0.clone(), event);
        Ok(())
    }

    async fn mark_terminal(
        &self,
        id: &EventId,
        status: EventStatus,
        error: Option<&str>,
        conversation_id: Option<&ConversationId>,
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        if let Some(event) = events.get_mut(&id.0) {
            event.status = status;
            event.error = error.map(str::to_owned);
            if conversation_id.is_some() {
                event.conversation_id = conversation_id.cloned();
            }
            event.processed_at = Some(processed_at);
        }
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Event>, RepositoryError> {
        let events = self.events.read().await;
        let mut all: Vec<Event> = events.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }
}

#[derive(Default)]
pub struct InMemoryEventReceiptRepository {
    receipts: RwLock<HashMap<String, EventReceipt>>,
}

#[async_trait::async_trait]
impl EventReceiptRepository for InMemoryEventReceiptRepository {
    async fn find_by_event_id(
        &self,
        event_id: &EventId,
    ) -> Result<Option<EventReceipt>, RepositoryError> {
        let receipts = self.receipts.read().await;
        Ok(receipts.get(&event_id.0).cloned())
    }

    async fn try_begin(&self, receipt: EventReceipt) -> Result<bool, RepositoryError> {
        let mut receipts = self.receipts.write().await;
        if receipts.contains_key(&receipt.event_id.0) {
            return Ok(false);
        }
        receipts.insert(receipt.event_id.0.clone(), receipt);
        Ok(true)
    }

    async fn mark_terminal(
        &self,
        event_id: &EventId,
        status: ReceiptStatus,
        result: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut receipts = self.receipts.write().await;
        if let Some(receipt) = receipts.get_mut(&event_id.0) {
            receipt.status = status;
            receipt.result = result.map(str::to_owned);
            receipt.completed_at = Some(completed_at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id.0).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.values().find(|c| c.customer_phone == phone).cloned())
    }

    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        if conversations.values().any(|c| c.customer_phone == conversation.customer_phone) {
            return Err(RepositoryError::Decode(format!(
                "conversation for phone {} already exists",
                conversation.customer_phone
            )));
        }
        conversations.insert(conversation.id.0.clone(), conversation);
        Ok(())
    }

    async fn update(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id.0.clone(), conversation);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: Message) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.push(message);
        Ok(())
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|message| message.conversation_id == *conversation_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPendingActionRepository {
    actions: RwLock<HashMap<String, PendingAction>>,
}

#[async_trait::async_trait]
impl PendingActionRepository for InMemoryPendingActionRepository {
    async fn find_by_id(
        &self,
        id: &PendingActionId,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let actions = self.actions.read().await;
        Ok(actions.get(&id.0).cloned())
    }

    async fn create(&self, action: PendingAction) -> Result<(), RepositoryError> {
        let mut actions = self.actions.write().await;
        actions.insert(action.id.0.clone(), action);
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: ActionStatus,
        limit: u32,
    ) -> Result<Vec<PendingAction>, RepositoryError> {
        let actions = self.actions.read().await;
        let mut matching: Vec<PendingAction> =
            actions.values().filter(|action| action.status == status).cloned().collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn resolve(
        &self,
        id: &PendingActionId,
        status: ActionStatus,
        resolved_by: &str,
        notes: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome, RepositoryError> {
        let mut actions = self.actions.write().await;
        let Some(action) = actions.get_mut(&id.0) else {
            return Ok(ResolveOutcome::NotFound);
        };
        if action.status != ActionStatus::Pending {
            return Ok(ResolveOutcome::AlreadyResolved(action.status));
        }

        action.status = status;
        action.resolved_at = Some(resolved_at);
        action.resolved_by = Some(resolved_by.to_owned());
        action.notes = notes.map(str::to_owned);
        Ok(ResolveOutcome::Resolved(action.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<String, Job>>,
}

#[async_trait::async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id.0).cloned())
    }

    async fn create(&self, job: Job) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.0.clone(), job);
        Ok(())
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Job>, RepositoryError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<Job> =
            jobs.values().filter(|job| job.conversation_id == *conversation_id).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryAuditLogRepository {
    entries: RwLock<Vec<AuditEvent>>,
}

#[async_trait::async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, entry: AuditEvent) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditEvent>, RepositoryError> {
        let entries = self.entries.read().await;
        let mut all: Vec<AuditEvent> = entries.clone();
        all.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        all.truncate(limit as usize);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use leadline_core::domain::action::{
        ActionPayload, ActionStatus, ActionType, PendingAction, PendingActionId,
    };
    use leadline_core::domain::conversation::ConversationId;
    use leadline_core::domain::event::{EventId, EventReceipt};

    use crate::repositories::{
        EventReceiptRepository, InMemoryEventReceiptRepository, InMemoryPendingActionRepository,
        PendingActionRepository, ResolveOutcome,
    };

    #[tokio::test]
    async fn in_memory_receipts_enforce_first_writer_wins() {
        let repo = InMemoryEventReceiptRepository::default();
        let receipt = EventReceipt::processing(EventId("evt-1".to_owned()), Utc::now());

        assert!(repo.try_begin(receipt.clone()).await.expect("first begin"));
        assert!(!repo.try_begin(receipt).await.expect("second begin loses"));
    }

    #[tokio::test]
    async fn in_memory_actions_resolve_exactly_once() {
        let repo = InMemoryPendingActionRepository::default();
        repo.create(PendingAction {
            id: PendingActionId("act-1".to_owned()),
            conversation_id: ConversationId("conv-1".to_owned()),
            action_type: ActionType::SendReply,
            description: "Send drafted reply".to_owned(),
            payload: ActionPayload::SendMessage {
                to: "+15550100".to_owned(),
                body: "hi".to_owned(),
            },
            status: ActionStatus::Pending,
            resolved_at: None,
            resolved_by: None,
            notes: None,
            created_at: Utc::now(),
        })
        .await
        .expect("create");

        let id = PendingActionId("act-1".to_owned());
        let first = repo
            .resolve(&id, ActionStatus::Rejected, "operator:dana", None, Utc::now())
            .await
            .expect("first resolve");
        assert!(matches!(first, ResolveOutcome::Resolved(_)));

        let second = repo
            .resolve(&id, ActionStatus::Approved, "operator:kim", None, Utc::now())
            .await
            .expect("second resolve");
        assert_eq!(second, ResolveOutcome::AlreadyResolved(ActionStatus::Rejected));
    }
}
