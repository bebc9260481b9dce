use serde::{Deserialize, Serialize};

use crate::config::BusinessProfile;
use crate::domain::conversation::{Conversation, Message};

/// Immutable snapshot of the state relevant to one event, assembled by the
/// context builder before planning. Planner and runner both read from the
/// same snapshot; neither mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub conversation: Option<Conversation>,
    pub history: Vec<Message>,
    pub business: BusinessProfile,
}

impl ContextSnapshot {
    pub fn new(
        conversation: Option<Conversation>,
        history: Vec<Message>,
        business: BusinessProfile,
    ) -> Self {
        Self { conversation, history, business }
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.conversation.as_ref().and_then(|conversation| conversation.customer_name.as_deref())
    }

    /// Latest customer-authored text, if any. Used by the quote and intake
    /// adapters to anchor drafted replies.
    pub fn last_customer_message(&self) -> Option<&Message> {
        self.history
            .iter()
            .rev()
            .find(|message| message.role == crate::domain::conversation::MessageRole::Customer)
    }
}
