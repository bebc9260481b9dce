use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;

use leadline_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use leadline_core::domain::conversation::ConversationId;
use leadline_core::domain::event::EventId;

use super::{AuditLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditLogRepository {
    pool: DbPool,
}

impl SqlAuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn category_as_str(category: &AuditCategory) -> &'static str {
    match category {
        AuditCategory::Ingress => "ingress",
        AuditCategory::Planning => "planning",
        AuditCategory::Execution => "execution",
        AuditCategory::Approval => "approval",
        AuditCategory::Persistence => "persistence",
        AuditCategory::System => "system",
    }
}

fn parse_category(raw: &str) -> AuditCategory {
    match raw {
        "ingress" => AuditCategory::Ingress,
        "planning" => AuditCategory::Planning,
        "execution" => AuditCategory::Execution,
        "approval" => AuditCategory::Approval,
        "persistence" => AuditCategory::Persistence,
        _ => AuditCategory::System,
    }
}

fn outcome_as_str(outcome: &AuditOutcome) -> &'static str {
    match outcome {
        AuditOutcome::Success => "success",
        AuditOutcome::Rejected => "rejected",
        AuditOutcome::Failed => "failed",
    }
}

fn parse_outcome(raw: &str) -> AuditOutcome {
    match raw {
        "rejected" => AuditOutcome::Rejected,
        "failed" => AuditOutcome::Failed,
        _ => AuditOutcome::Success,
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let entry_id: String =
        row.try_get("entry_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let event_id: Option<String> =
        row.try_get("event_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: Option<String> =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let correlation_id: String =
        row.try_get("correlation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action: String =
        row.try_get("action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category_str: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor: String = row.try_get("actor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let outcome_str: String =
        row.try_get("outcome").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata_json: String =
        row.try_get("metadata_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at_str: String =
        row.try_get("occurred_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid audit metadata: {e}")))?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp: {e}")))?;

    Ok(AuditEvent {
        entry_id,
        event_id: event_id.map(EventId),
        conversation_id: conversation_id.map(ConversationId),
        correlation_id,
        action,
        category: parse_category(&category_str),
        actor,
        outcome: parse_outcome(&outcome_str),
        metadata,
        occurred_at,
    })
}

#[async_trait::async_trait]
impl AuditLogRepository for SqlAuditLogRepository {
    async fn append(&self, entry: AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&entry.metadata)
            .map_err(|e| RepositoryError::Decode(format!("metadata encode failed: {e}")))?;

        sqlx::query(
            "INSERT INTO audit_event (entry_id, event_id, conversation_id, correlation_id,
                                      action, category, actor, outcome, metadata_json,
                                      occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.entry_id)
        .bind(entry.event_id.as_ref().map(|id| id.0.as_str()))
        .bind(entry.conversation_id.as_ref().map(|id| id.0.as_str()))
        .bind(&entry.correlation_id)
        .bind(&entry.action)
        .bind(category_as_str(&entry.category))
        .bind(&entry.actor)
        .bind(outcome_as_str(&entry.outcome))
        .bind(metadata_json)
        .bind(entry.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT entry_id, event_id, conversation_id, correlation_id, action, category,
                    actor, outcome, metadata_json, occurred_at
             FROM audit_event ORDER BY occurred_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use leadline_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
    use leadline_core::domain::event::EventId;

    use super::SqlAuditLogRepository;
    use crate::repositories::AuditLogRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn append_and_list_round_trips_metadata() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlAuditLogRepository::new(pool);

        repo.append(
            AuditEvent::new(
                Some(EventId("evt-1".to_string())),
                None,
                "req-1",
                "orchestration.step_failed",
                AuditCategory::Execution,
                "step-runner",
                AuditOutcome::Failed,
            )
            .with_metadata("step", "send_reply")
            .with_metadata("error", "provider timeout"),
        )
        .await
        .expect("append");

        let entries = repo.list_recent(10).await.expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "orchestration.step_failed");
        assert_eq!(entries[0].outcome, AuditOutcome::Failed);
        assert_eq!(entries[0].metadata.get("error").map(String::as_str), Some("provider timeout"));
    }
}
