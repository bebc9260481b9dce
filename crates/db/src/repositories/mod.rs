use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use leadline_core::audit::AuditEvent;
use leadline_core::domain::action::{ActionStatus, PendingAction, PendingActionId};
use leadline_core::domain::conversation::{Conversation, ConversationId, Message};
use leadline_core::domain::event::{
    Event, EventId, EventReceipt, EventStatus, ReceiptStatus,
};
use leadline_core::domain::job::{Job, JobId};

pub mod action;
pub mod audit;
pub mod conversation;
pub mod event;
pub mod job;
pub mod memory;

pub use action::SqlPendingActionRepository;
pub use audit::SqlAuditLogRepository;
pub use conversation::{SqlConversationRepository, SqlMessageRepository};
pub use event::{SqlEventReceiptRepository, SqlEventRepository};
pub use job::SqlJobRepository;
pub use memory::{
    InMemoryAuditLogRepository, InMemoryConversationRepository, InMemoryEventReceiptRepository,
    InMemoryEventRepository, InMemoryJobRepository, InMemoryMessageRepository,
    InMemoryPendingActionRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result of a status-guarded compare-and-set on a pending action. The three
/// cases let callers distinguish a lost race from a bad id without a second
/// query.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolveOutcome {
    Resolved(PendingAction),
    AlreadyResolved(ActionStatus),
    NotFound,
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn find_by_id(&self, id: &EventId) -> Result<Option<Event>, RepositoryError>;
    async fn create(&self, event: Event) -> Result<(), RepositoryError>;
    async fn mark_terminal(
        &self,
        id: &EventId,
        status: EventStatus,
        error: Option<&str>,
        conversation_id: Option<&ConversationId>,
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<Event>, RepositoryError>;
}

#[async_trait]
pub trait EventReceiptRepository: Send + Sync {
    async fn find_by_event_id(
        &self,
        event_id: &EventId,
    ) -> Result<Option<EventReceipt>, RepositoryError>;

    /// Insert a processing receipt guarded by the event_id uniqueness
    /// constraint. Returns false when another ingress already holds the id.
    async fn try_begin(&self, receipt: EventReceipt) -> Result<bool, RepositoryError>;

    async fn mark_terminal(
        &self,
        event_id: &EventId,
        status: ReceiptStatus,
        result: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(&self, id: &ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Conversation>, RepositoryError>;
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError>;
    async fn update(&self, conversation: Conversation) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: Message) -> Result<(), RepositoryError>;
    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait PendingActionRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &PendingActionId,
    ) -> Result<Option<PendingAction>, RepositoryError>;
    async fn create(&self, action: PendingAction) -> Result<(), RepositoryError>;
    async fn list_by_status(
        &self,
        status: ActionStatus,
        limit: u32,
    ) -> Result<Vec<PendingAction>, RepositoryError>;

    /// Compare-and-set pending -> approved|rejected. Never overwrites a
    /// resolution that already happened.
    async fn resolve(
        &self,
        id: &PendingActionId,
        status: ActionStatus,
        resolved_by: &str,
        notes: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome, RepositoryError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;
    async fn create(&self, job: Job) -> Result<(), RepositoryError>;
    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Job>, RepositoryError>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entry: AuditEvent) -> Result<(), RepositoryError>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditEvent>, RepositoryError>;
}
