use chrono::{DateTime, Utc};
use sqlx::Row;

use leadline_core::domain::conversation::{
    Conversation, ConversationId, ConversationStatus, Message, MessageId, MessageRole,
};
use leadline_core::domain::event::EventType;

use super::{ConversationRepository, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_phone: String =
        row.try_get("customer_phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_name: Option<String> =
        row.try_get("customer_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source_str: String =
        row.try_get("source").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let agent_type: String =
        row.try_get("agent_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let source = EventType::parse(&source_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown conversation source `{source_str}`"))
    })?;
    let status = ConversationStatus::parse(&status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown conversation status `{status_str}`"))
    })?;

    Ok(Conversation {
        id: ConversationId(id),
        customer_phone,
        customer_name,
        source,
        status,
        agent_type,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_phone, customer_name, source, status, agent_type,
                    created_at, updated_at
             FROM conversation WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_conversation(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_phone, customer_name, source, status, agent_type,
                    created_at, updated_at
             FROM conversation WHERE customer_phone = ?",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_conversation(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation (id, customer_phone, customer_name, source, status,
                                       agent_type, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.customer_phone)
        .bind(&conversation.customer_name)
        .bind(conversation.source.as_str())
        .bind(conversation.status.as_str())
        .bind(&conversation.agent_type)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE conversation
             SET customer_name = ?, status = ?, agent_type = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&conversation.customer_name)
        .bind(conversation.status.as_str())
        .bind(&conversation.agent_type)
        .bind(conversation.updated_at.to_rfc3339())
        .bind(&conversation.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = MessageRole::parse(&role_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role_str}`")))?;

    Ok(Message {
        id: MessageId(id),
        conversation_id: ConversationId(conversation_id),
        role,
        content,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn append(&self, message: Message) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO message (id, conversation_id, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.conversation_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at
             FROM message WHERE conversation_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use leadline_core::domain::conversation::{
        Conversation, ConversationId, ConversationStatus, Message, MessageId, MessageRole,
    };
    use leadline_core::domain::event::EventType;

    use super::{SqlConversationRepository, SqlMessageRepository};
    use crate::repositories::{ConversationRepository, MessageRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_conversation(id: &str, phone: &str) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: ConversationId(id.to_string()),
            customer_phone: phone.to_string(),
            customer_name: None,
            source: EventType::MissedCall,
            status: ConversationStatus::Active,
            agent_type: "intake".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn phone_is_the_lookup_key() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);

        repo.create(sample_conversation("conv-1", "+15550100")).await.expect("create");

        let found = repo.find_by_phone("+15550100").await.expect("find").expect("exists");
        assert_eq!(found.id.0, "conv-1");
        assert!(repo.find_by_phone("+15550199").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn duplicate_phone_is_rejected_by_the_schema() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);

        repo.create(sample_conversation("conv-1", "+15550100")).await.expect("create");
        let error = repo
            .create(sample_conversation("conv-2", "+15550100"))
            .await
            .expect_err("second conversation for one phone must fail");
        assert!(matches!(error, crate::repositories::RepositoryError::Database(_)));
    }

    #[tokio::test]
    async fn update_persists_status_and_name_changes() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);

        repo.create(sample_conversation("conv-1", "+15550100")).await.expect("create");

        let mut conversation =
            repo.find_by_id(&ConversationId("conv-1".to_string())).await.expect("find").expect("exists");
        conversation.customer_name = Some("Dana R".to_string());
        conversation.status = ConversationStatus::Qualified;
        conversation.updated_at = Utc::now();
        repo.update(conversation).await.expect("update");

        let found = repo
            .find_by_id(&ConversationId("conv-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.status, ConversationStatus::Qualified);
        assert_eq!(found.customer_name.as_deref(), Some("Dana R"));
    }

    #[tokio::test]
    async fn messages_append_in_order() {
        let pool = setup().await;
        let conversations = SqlConversationRepository::new(pool.clone());
        let messages = SqlMessageRepository::new(pool);

        conversations.create(sample_conversation("conv-1", "+15550100")).await.expect("create");

        let base = Utc::now();
        for (index, (role, content)) in [
            (MessageRole::System, "Missed call from +15550100"),
            (MessageRole::Ai, "Sorry we missed you! How can we help?"),
            (MessageRole::Customer, "Need my gutters cleaned"),
        ]
        .into_iter()
        .enumerate()
        {
            messages
                .append(Message {
                    id: MessageId(format!("msg-{index}")),
                    conversation_id: ConversationId("conv-1".to_string()),
                    role,
                    content: content.to_string(),
                    created_at: base + chrono::Duration::seconds(index as i64),
                })
                .await
                .expect("append");
        }

        let history = messages
            .list_for_conversation(&ConversationId("conv-1".to_string()))
            .await
            .expect("list");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, MessageRole::System);
        assert_eq!(history[2].content, "Need my gutters cleaned");
    }
}
