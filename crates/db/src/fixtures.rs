//! Deterministic demo fixtures for local development and the `seed` CLI
//! command. Safe to run against an empty database only.

use chrono::{Duration, TimeZone, Utc};

use leadline_core::domain::conversation::{
    Conversation, ConversationId, ConversationStatus, Message, MessageId, MessageRole,
};
use leadline_core::domain::event::{
    Event, EventId, EventPayload, EventReceipt, EventStatus, EventType, ReceiptStatus,
};

use crate::repositories::{
    ConversationRepository, EventReceiptRepository, EventRepository, MessageRepository,
    RepositoryError, SqlConversationRepository, SqlEventReceiptRepository, SqlEventRepository,
    SqlMessageRepository,
};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub conversations: u32,
    pub messages: u32,
    pub events: u32,
}

pub async fn seed_demo_data(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let conversations = SqlConversationRepository::new(pool.clone());
    let messages = SqlMessageRepository::new(pool.clone());
    let events = SqlEventRepository::new(pool.clone());
    let receipts = SqlEventReceiptRepository::new(pool.clone());

    // Fixed base instant keeps reseeded databases byte-comparable.
    let base = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).single().unwrap_or_else(Utc::now);

    let conversation = Conversation {
        id: ConversationId("demo-conv-1".to_string()),
        customer_phone: "+15550100".to_string(),
        customer_name: Some("Dana Demo".to_string()),
        source: EventType::MissedCall,
        status: ConversationStatus::Active,
        agent_type: "intake".to_string(),
        created_at: base,
        updated_at: base,
    };
    conversations.create(conversation).await?;

    let transcript = [
        (MessageRole::System, "Missed call from +15550100"),
        (MessageRole::Ai, "Sorry we missed your call! How can we help?"),
        (MessageRole::Customer, "Looking for a gutter cleaning quote"),
    ];
    for (index, (role, content)) in transcript.into_iter().enumerate() {
        messages
            .append(Message {
                id: MessageId(format!("demo-msg-{index}")),
                conversation_id: ConversationId("demo-conv-1".to_string()),
                role,
                content: content.to_string(),
                created_at: base + Duration::seconds(index as i64),
            })
            .await?;
    }

    let event = Event {
        id: EventId("demo-evt-1".to_string()),
        event_type: EventType::MissedCall,
        payload: EventPayload::MissedCall {
            phone: "+15550100".to_string(),
            caller_name: Some("Dana Demo".to_string()),
        },
        status: EventStatus::Completed,
        conversation_id: Some(ConversationId("demo-conv-1".to_string())),
        error: None,
        created_at: base,
        processed_at: Some(base + Duration::seconds(2)),
    };
    events.create(event).await?;

    let mut receipt = EventReceipt::processing(EventId("demo-evt-1".to_string()), base);
    receipt.status = ReceiptStatus::Completed;
    receipt.result = Some("plan completed".to_string());
    receipt.completed_at = Some(base + Duration::seconds(2));
    receipts.try_begin(receipt).await?;

    Ok(SeedResult { conversations: 1, messages: 3, events: 1 })
}

#[cfg(test)]
mod tests {
    use leadline_core::domain::conversation::ConversationId;

    use super::seed_demo_data;
    use crate::repositories::{
        ConversationRepository, MessageRepository, SqlConversationRepository, SqlMessageRepository,
    };
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_populates_a_replayable_demo_conversation() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let result = seed_demo_data(&pool).await.expect("seed");
        assert_eq!(result.conversations, 1);
        assert_eq!(result.messages, 3);
        assert_eq!(result.events, 1);

        let conversation = SqlConversationRepository::new(pool.clone())
            .find_by_phone("+15550100")
            .await
            .expect("find")
            .expect("seeded conversation exists");
        assert_eq!(conversation.id.0, "demo-conv-1");

        let history = SqlMessageRepository::new(pool)
            .list_for_conversation(&ConversationId("demo-conv-1".to_string()))
            .await
            .expect("list");
        assert_eq!(history.len(), 3);
    }
}
