use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingActionId(pub String);

impl std::fmt::Display for PendingActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendReply,
    SendQuote,
    BookJob,
    RequestReview,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendReply => "send_reply",
            Self::SendQuote => "send_quote",
            Self::BookJob => "book_job",
            Self::RequestReview => "request_review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "send_reply" => Some(Self::SendReply),
            "send_quote" => Some(Self::SendQuote),
            "book_job" => Some(Self::BookJob),
            "request_review" => Some(Self::RequestReview),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Fully resolved side effect, serialized into the pending_action row.
/// Replaying one of these never re-invokes an agent adapter: everything the
/// commit needs (message text, price, date) is already here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    SendMessage {
        to: String,
        body: String,
    },
    SendQuote {
        to: String,
        body: String,
        price: Decimal,
        service_type: String,
    },
    BookJob {
        customer_name: String,
        customer_phone: String,
        service_type: String,
        scheduled_date: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        estimated_price: Option<Decimal>,
        confirmation_body: String,
    },
}

impl ActionPayload {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::SendMessage { .. } => ActionType::SendReply,
            Self::SendQuote { .. } => ActionType::SendQuote,
            Self::BookJob { .. } => ActionType::BookJob,
        }
    }
}

/// Durable checkpoint for a step awaiting human approval. Resolved exactly
/// once; the pending -> approved|rejected transition is compare-and-set
/// guarded at the repository layer and re-checked here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: PendingActionId,
    pub conversation_id: ConversationId,
    pub action_type: ActionType,
    pub description: String,
    pub payload: ActionPayload,
    pub status: ActionStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn resolve(
        &mut self,
        status: ActionStatus,
        resolved_by: impl Into<String>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != ActionStatus::Pending {
            return Err(DomainError::ActionAlreadyResolved {
                id: self.id.clone(),
                status: self.status,
            });
        }
        if status == ActionStatus::Pending {
            return Err(DomainError::InvariantViolation(
                "pending action cannot be resolved back to pending".to_owned(),
            ));
        }

        self.status = status;
        self.resolved_at = Some(now);
        self.resolved_by = Some(resolved_by.into());
        self.notes = notes;
        Ok(())
    }
}
