use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use leadline_core::domain::conversation::ConversationId;
use leadline_core::domain::job::{Job, JobId, JobStatus};

use super::{JobRepository, RepositoryError};
use crate::DbPool;

pub struct SqlJobRepository {
    pool: DbPool,
}

impl SqlJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_name: String =
        row.try_get("customer_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_phone: String =
        row.try_get("customer_phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let service_type: String =
        row.try_get("service_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let scheduled_date: String =
        row.try_get("scheduled_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let estimated_price_str: Option<String> =
        row.try_get("estimated_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let fsm_ref: Option<String> =
        row.try_get("fsm_ref").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown job status `{status_str}`")))?;
    let estimated_price = estimated_price_str
        .map(|raw| {
            raw.parse::<Decimal>()
                .map_err(|e| RepositoryError::Decode(format!("invalid price `{raw}`: {e}")))
        })
        .transpose()?;

    Ok(Job {
        id: JobId(id),
        conversation_id: ConversationId(conversation_id),
        customer_name,
        customer_phone,
        service_type,
        scheduled_date,
        estimated_price,
        fsm_ref,
        status,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl JobRepository for SqlJobRepository {
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, customer_name, customer_phone, service_type,
                    scheduled_date, estimated_price, fsm_ref, status, created_at
             FROM job WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_job(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, job: Job) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO job (id, conversation_id, customer_name, customer_phone, service_type,
                              scheduled_date, estimated_price, fsm_ref, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id.0)
        .bind(&job.conversation_id.0)
        .bind(&job.customer_name)
        .bind(&job.customer_phone)
        .bind(&job.service_type)
        .bind(&job.scheduled_date)
        .bind(job.estimated_price.map(|price| price.to_string()))
        .bind(&job.fsm_ref)
        .bind(job.status.as_str())
        .bind(job.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Job>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, conversation_id, customer_name, customer_phone, service_type,
                    scheduled_date, estimated_price, fsm_ref, status, created_at
             FROM job WHERE conversation_id = ? ORDER BY created_at DESC",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }
}
