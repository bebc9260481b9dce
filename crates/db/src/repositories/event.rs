use chrono::{DateTime, Utc};
use sqlx::Row;

use leadline_core::domain::conversation::ConversationId;
use leadline_core::domain::event::{
    Event, EventId, EventPayload, EventReceipt, EventStatus, EventType, ReceiptStatus,
};

use super::{EventReceiptRepository, EventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEventRepository {
    pool: DbPool,
}

impl SqlEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<Event, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let event_type_str: String =
        row.try_get("event_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let payload_json: String =
        row.try_get("payload_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: Option<String> =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let error: Option<String> =
        row.try_get("error").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let processed_at_str: Option<String> =
        row.try_get("processed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let event_type = EventType::parse(&event_type_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown event type `{event_type_str}`")))?;
    let payload: EventPayload = serde_json::from_str(&payload_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid event payload: {e}")))?;
    let status = EventStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown event status `{status_str}`")))?;

    Ok(Event {
        id: EventId(id),
        event_type,
        payload,
        status,
        conversation_id: conversation_id.map(ConversationId),
        error,
        created_at: parse_timestamp(&created_at_str)?,
        processed_at: processed_at_str.as_deref().map(parse_timestamp).transpose()?,
    })
}

#[async_trait::async_trait]
impl EventRepository for SqlEventRepository {
    async fn find_by_id(&self, id: &EventId) -> Result<Option<Event>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, event_type, payload_json, status, conversation_id, error,
                    created_at, processed_at
             FROM event WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_event(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, event: Event) -> Result<(), RepositoryError> {
        let payload_json = serde_json::to_string(&event.payload)
            .map_err(|e| RepositoryError::Decode(format!("payload encode failed: {e}")))?;

        sqlx::query(
            "INSERT INTO event (id, event_type, payload_json, status, conversation_id, error,
                                created_at, processed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(event.event_type.as_str())
        .bind(payload_json)
        .bind(event.status.as_str())
        .bind(event.conversation_id.as_ref().map(|id| id.0.as_str()))
        .bind(&event.error)
        .bind(event.created_at.to_rfc3339())
        .bind(event.processed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

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
        sqlx::query(
            "UPDATE event
             SET status = ?, error = ?, conversation_id = COALESCE(?, conversation_id),
                 processed_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(conversation_id.map(|c| c.0.as_str()))
        .bind(processed_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Event>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, event_type, payload_json, status, conversation_id, error,
                    created_at, processed_at
             FROM event ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

pub struct SqlEventReceiptRepository {
    pool: DbPool,
}

impl SqlEventReceiptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_receipt(row: &sqlx::sqlite::SqliteRow) -> Result<EventReceipt, RepositoryError> {
    let event_id: String =
        row.try_get("event_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let result: Option<String> =
        row.try_get("result").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let completed_at_str: Option<String> =
        row.try_get("completed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = ReceiptStatus::parse(&status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown receipt status `{status_str}`"))
    })?;

    Ok(EventReceipt {
        event_id: EventId(event_id),
        status,
        result,
        completed_at: completed_at_str.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl EventReceiptRepository for SqlEventReceiptRepository {
    async fn find_by_event_id(
        &self,
        event_id: &EventId,
    ) -> Result<Option<EventReceipt>, RepositoryError> {
        let row = sqlx::query(
            "SELECT event_id, status, result, completed_at, created_at
             FROM event_receipt WHERE event_id = ?",
        )
        .bind(&event_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_receipt(r)?)),
            None => Ok(None),
        }
    }

    async fn try_begin(&self, receipt: EventReceipt) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO event_receipt (event_id, status, result, completed_at, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(event_id) DO NOTHING",
        )
        .bind(&receipt.event_id.0)
        .bind(receipt.status.as_str())
        .bind(&receipt.result)
        .bind(receipt.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(receipt.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_terminal(
        &self,
        event_id: &EventId,
        status: ReceiptStatus,
        result: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE event_receipt SET status = ?, result = ?, completed_at = ? WHERE event_id = ?",
        )
        .bind(status.as_str())
        .bind(result)
        .bind(completed_at.to_rfc3339())
        .bind(&event_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
