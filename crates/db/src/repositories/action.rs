use chrono::{DateTime, Utc};
use sqlx::Row;

use leadline_core::domain::action::{
    ActionPayload, ActionStatus, ActionType, PendingAction, PendingActionId,
};
use leadline_core::domain::conversation::ConversationId;

use super::{PendingActionRepository, RepositoryError, ResolveOutcome};
use crate::DbPool;

pub struct SqlPendingActionRepository {
    pool: DbPool,
}

impl SqlPendingActionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_action(row: &sqlx::sqlite::SqliteRow) -> Result<PendingAction, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action_type_str: String =
        row.try_get("action_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let payload_json: String =
        row.try_get("payload_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_at_str: Option<String> =
        row.try_get("resolved_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_by: Option<String> =
        row.try_get("resolved_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let notes: Option<String> =
        row.try_get("notes").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let action_type = ActionType::parse(&action_type_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown action type `{action_type_str}`"))
    })?;
    let status = ActionStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action status `{status_str}`")))?;
    let payload: ActionPayload = serde_json::from_str(&payload_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid action payload: {e}")))?;

    Ok(PendingAction {
        id: PendingActionId(id),
        conversation_id: ConversationId(conversation_id),
        action_type,
        description,
        payload,
        status,
        resolved_at: resolved_at_str.as_deref().map(parse_timestamp).transpose()?,
        resolved_by,
        notes,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl PendingActionRepository for SqlPendingActionRepository {
    async fn find_by_id(
        &self,
        id: &PendingActionId,
    ) -> Result<Option<PendingAction>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, action_type, description, payload_json, status,
                    resolved_at, resolved_by, notes, created_at
             FROM pending_action WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_action(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, action: PendingAction) -> Result<(), RepositoryError> {
        let payload_json = serde_json::to_string(&action.payload)
            .map_err(|e| RepositoryError::Decode(format!("payload encode failed: {e}")))?;

        sqlx::query(
            "INSERT INTO pending_action (id, conversation_id, action_type, description,
                                         payload_json, status, resolved_at, resolved_by,
                                         notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&action.id.0)
        .bind(&action.conversation_id.0)
        .bind(action.action_type.as_str())
        .bind(&action.description)
        .bind(payload_json)
        .bind(action.status.as_str())
        .bind(action.resolved_at.map(|dt| dt.to_rfc3339()))
        .bind(&action.resolved_by)
        .bind(&action.notes)
        .bind(action.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_status(
        &self,
        status: ActionStatus,
        limit: u32,
    ) -> Result<Vec<PendingAction>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, conversation_id, action_type, description, payload_json, status,
                    resolved_at, resolved_by, notes, created_at
             FROM pending_action WHERE status = ? ORDER BY created_at ASC LIMIT ?",
        )
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_action).collect()
    }

    async fn resolve(
        &self,
        id: &PendingActionId,
        status: ActionStatus,
        resolved_by: &str,
        notes: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome, RepositoryError> {
        let result = sqlx::query(
            "UPDATE pending_action
             SET status = ?, resolved_at = ?, resolved_by = ?, notes = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(resolved_at.to_rfc3339())
        .bind(resolved_by)
        .bind(notes)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            let resolved = self.find_by_id(id).await?.ok_or_else(|| {
                RepositoryError::Decode(format!("resolved action {} disappeared", id.0))
            })?;
            return Ok(ResolveOutcome::Resolved(resolved));
        }

        match self.find_by_id(id).await? {
            Some(existing) => Ok(ResolveOutcome::AlreadyResolved(existing.status)),
            None => Ok(ResolveOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use leadline_core::domain::action::{
        ActionPayload, ActionStatus, ActionType, PendingAction, PendingActionId,
    };
    use leadline_core::domain::conversation::{Conversation, ConversationId, ConversationStatus};
    use leadline_core::domain::event::EventType;

    use super::SqlPendingActionRepository;
    use crate::repositories::{
        ConversationRepository, PendingActionRepository, ResolveOutcome,
        SqlConversationRepository,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    /// Insert a parent conversation so FK constraints are satisfied.
    async fn insert_conversation(pool: &sqlx::SqlitePool, id: &str) {
        let now = Utc::now();
        SqlConversationRepository::new(pool.clone())
            .create(Conversation {
                id: ConversationId(id.to_string()),
                customer_phone: format!("+1555{id}"),
                customer_name: None,
                source: EventType::InboundSms,
                status: ConversationStatus::Qualified,
                agent_type: "quote".to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("insert parent conversation");
    }

    fn sample_action(id: &str, conversation_id: &str) -> PendingAction {
        PendingAction {
            id: PendingActionId(id.to_string()),
            conversation_id: ConversationId(conversation_id.to_string()),
            action_type: ActionType::SendQuote,
            description: "Send drafted quote".to_string(),
            payload: ActionPayload::SendQuote {
                to: "+15550100".to_string(),
                body: "Gutter cleaning: $180 flat".to_string(),
                price: Decimal::new(18_000, 2),
                service_type: "gutter cleaning".to_string(),
            },
            status: ActionStatus::Pending,
            resolved_at: None,
            resolved_by: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_and_find_round_trips_the_replayable_payload() {
        let pool = setup().await;
        insert_conversation(&pool, "conv-1").await;

        let repo = SqlPendingActionRepository::new(pool);
        repo.create(sample_action("act-1", "conv-1")).await.expect("create");

        let found = repo
            .find_by_id(&PendingActionId("act-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.action_type, ActionType::SendQuote);
        assert!(matches!(
            found.payload,
            ActionPayload::SendQuote { ref price, .. } if *price == Decimal::new(18_000, 2)
        ));
    }

    #[tokio::test]
    async fn resolve_is_first_resolution_wins() {
        let pool = setup().await;
        insert_conversation(&pool, "conv-1").await;

        let repo = SqlPendingActionRepository::new(pool);
        repo.create(sample_action("act-1", "conv-1")).await.expect("create");
        let id = PendingActionId("act-1".to_string());

        let first = repo
            .resolve(&id, ActionStatus::Approved, "operator:dana", Some("looks right"), Utc::now())
            .await
            .expect("first resolve");
        assert!(matches!(
            first,
            ResolveOutcome::Resolved(ref action) if action.status == ActionStatus::Approved
        ));

        let second = repo
            .resolve(&id, ActionStatus::Rejected, "operator:kim", None, Utc::now())
            .await
            .expect("second resolve call");
        assert_eq!(second, ResolveOutcome::AlreadyResolved(ActionStatus::Approved));

        let found = repo.find_by_id(&id).await.expect("find").expect("exists");
        assert_eq!(found.resolved_by.as_deref(), Some("operator:dana"));
        assert_eq!(found.notes.as_deref(), Some("looks right"));
    }

    #[tokio::test]
    async fn resolving_an_unknown_id_reports_not_found() {
        let pool = setup().await;
        let repo = SqlPendingActionRepository::new(pool);

        let outcome = repo
            .resolve(
                &PendingActionId("missing".to_string()),
                ActionStatus::Approved,
                "operator:dana",
                None,
                Utc::now(),
            )
            .await
            .expect("resolve call");
        assert_eq!(outcome, ResolveOutcome::NotFound);
    }

    #[tokio::test]
    async fn list_by_status_filters_pending_items_oldest_first() {
        let pool = setup().await;
        insert_conversation(&pool, "conv-1").await;
        insert_conversation(&pool, "conv-2").await;

        let repo = SqlPendingActionRepository::new(pool);

        let mut first = sample_action("act-1", "conv-1");
        first.created_at = Utc::now() - chrono::Duration::minutes(10);
        repo.create(first).await.expect("create 1");
        repo.create(sample_action("act-2", "conv-2")).await.expect("create 2");
        repo.resolve(
            &PendingActionId("act-2".to_string()),
            ActionStatus::Rejected,
            "operator:dana",
            None,
            Utc::now(),
        )
        .await
        .expect("resolve 2");

        let pending = repo.list_by_status(ActionStatus::Pending, 50).await.expect("list pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id.0, "act-1");

        let rejected =
            repo.list_by_status(ActionStatus::Rejected, 50).await.expect("list rejected");
        assert_eq!(rejected.len(), 1);
    }
}
