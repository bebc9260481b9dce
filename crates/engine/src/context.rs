use std::sync::Arc;

use leadline_core::context::ContextSnapshot;
use leadline_core::domain::conversation::Conversation;
use leadline_core::errors::OrchestrationError;
use leadline_db::repositories::MessageRepository;

use crate::Services;

/// Read-only assembly of the state snapshot handed to the planner and step
/// runner. Loads, never writes.
pub struct ContextBuilder {
    services: Arc<Services>,
}

impl ContextBuilder {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    pub async fn build(
        &self,
        conversation: Option<Conversation>,
    ) -> Result<ContextSnapshot, OrchestrationError> {
        let history = match &conversation {
            Some(conversation) => self
                .services
                .messages
                .list_for_conversation(&conversation.id)
                .await
                .map_err(|error| OrchestrationError::Persistence(error.to_string()))?,
            None => Vec::new(),
        };

        Ok(ContextSnapshot::new(conversation, history, self.services.business.clone()))
    }
}
