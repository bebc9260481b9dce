use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsmError {
    #[error("fsm transport failed: {0}")]
    Transport(String),
    #[error("fsm rejected the request ({status}): {message}")]
    Provider { status: u16, message: String },
}

/// External id minted by the FSM system, stored for cross-referencing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExternalRef(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLead {
    pub name: String,
    pub phone: String,
    pub requested_service: String,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewFsmJob {
    pub customer_name: String,
    pub customer_phone: String,
    pub service_type: String,
    pub scheduled_date: String,
    pub estimated_price: Option<Decimal>,
}

#[async_trait]
pub trait FsmClient: Send + Sync {
    async fn create_lead(&self, lead: NewLead) -> Result<ExternalRef, FsmError>;
    async fn create_job(&self, job: NewFsmJob) -> Result<ExternalRef, FsmError>;
}

pub struct HttpFsmClient {
    client: reqwest::Client,
    api_base_url: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct FsmCreatedResponse {
    id: String,
}

impl HttpFsmClient {
    pub fn new(
        api_base_url: impl Into<String>,
        api_key: SecretString,
        timeout_secs: u64,
    ) -> Result<Self, FsmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| FsmError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            api_key,
        })
    }

    async fn post_created(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<ExternalRef, FsmError> {
        let url = format!("{}{path}", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| FsmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FsmError::Provider { status: status.as_u16(), message });
        }

        let decoded: FsmCreatedResponse = response
            .json()
            .await
            .map_err(|error| FsmError::Transport(format!("invalid fsm response: {error}")))?;

        debug!(event_name = "comms.fsm.created", external_ref = %decoded.id, path, "fsm record created");
        Ok(ExternalRef(decoded.id))
    }
}

#[async_trait]
impl FsmClient for HttpFsmClient {
    async fn create_lead(&self, lead: NewLead) -> Result<ExternalRef, FsmError> {
        self.post_created(
            "/leads",
            serde_json::json!({
                "name": lead.name,
                "phone": lead.phone,
                "requested_service": lead.requested_service,
                "notes": lead.notes,
            }),
        )
        .await
    }

    async fn create_job(&self, job: NewFsmJob) -> Result<ExternalRef, FsmError> {
        self.post_created(
            "/jobs",
            serde_json::json!({
                "customer_name": job.customer_name,
                "customer_phone": job.customer_phone,
                "service_type": job.service_type,
                "scheduled_date": job.scheduled_date,
                "estimated_price": job.estimated_price.map(|price| price.to_string()),
            }),
        )
        .await
    }
}

/// Mints local refs without calling anything. Used when fsm.enabled is false.
#[derive(Default)]
pub struct NoopFsmClient;

#[async_trait]
impl FsmClient for NoopFsmClient {
    async fn create_lead(&self, lead: NewLead) -> Result<ExternalRef, FsmError> {
        info!(event_name = "comms.fsm.noop", phone = %lead.phone, "fsm disabled; lead kept local");
        Ok(ExternalRef(format!("local-lead-{}", Uuid::new_v4())))
    }

    async fn create_job(&self, job: NewFsmJob) -> Result<ExternalRef, FsmError> {
        info!(event_name = "comms.fsm.noop", phone = %job.customer_phone, "fsm disabled; job kept local");
        Ok(ExternalRef(format!("local-job-{}", Uuid::new_v4())))
    }
}

/// Test double: records created leads/jobs and supports scripted failures.
#[derive(Default)]
pub struct RecordingFsmClient {
    leads: Mutex<Vec<NewLead>>,
    jobs: Mutex<Vec<NewFsmJob>>,
    fail_with: Mutex<Option<FsmError>>,
}

impl RecordingFsmClient {
    pub fn leads(&self) -> Vec<NewLead> {
        match self.leads.lock() {
            Ok(leads) => leads.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn jobs(&self) -> Vec<NewFsmJob> {
        match self.jobs.lock() {
            Ok(jobs) => jobs.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn fail_with(&self, error: FsmError) {
        if let Ok(mut fail) = self.fail_with.lock() {
            *fail = Some(error);
        }
    }

    fn scripted_failure(&self) -> Option<FsmError> {
        match self.fail_with.lock() {
            Ok(fail) => fail.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl FsmClient for RecordingFsmClient {
    async fn create_lead(&self, lead: NewLead) -> Result<ExternalRef, FsmError> {
        if let Some(error) = self.scripted_failure() {
            return Err(error);
        }
        let reference = ExternalRef(format!("lead-{}", self.leads().len() + 1));
        match self.leads.lock() {
            Ok(mut leads) => leads.push(lead),
            Err(poisoned) => poisoned.into_inner().push(lead),
        }
        Ok(reference)
    }

    async fn create_job(&self, job: NewFsmJob) -> Result<ExternalRef, FsmError> {
        if let Some(error) = self.scripted_failure() {
            return Err(error);
        }
        let reference = ExternalRef(format!("job-{}", self.jobs().len() + 1));
        match self.jobs.lock() {
            Ok(mut jobs) => jobs.push(job),
            Err(poisoned) => poisoned.into_inner().push(job),
        }
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{FsmClient, FsmError, NewFsmJob, NewLead, RecordingFsmClient};

    fn lead() -> NewLead {
        NewLead {
            name: "Dana R".to_owned(),
            phone: "+15550100".to_owned(),
            requested_service: "lawn care".to_owned(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn recording_client_mints_sequential_refs() {
        let client = RecordingFsmClient::default();

        let first = client.create_lead(lead()).await.expect("create lead");
        assert_eq!(first.0, "lead-1");

        let job_ref = client
            .create_job(NewFsmJob {
                customer_name: "Dana R".to_owned(),
                customer_phone: "+15550100".to_owned(),
                service_type: "lawn care".to_owned(),
                scheduled_date: "2026-03-14".to_owned(),
                estimated_price: Some(Decimal::new(9_500, 2)),
            })
            .await
            .expect("create job");
        assert_eq!(job_ref.0, "job-1");
        assert_eq!(client.leads().len(), 1);
        assert_eq!(client.jobs().len(), 1);
    }

    #[tokio::test]
    async fn scripted_failure_propagates_to_callers() {
        let client = RecordingFsmClient::default();
        client.fail_with(FsmError::Provider { status: 503, message: "maintenance".to_owned() });

        let error = client.create_lead(lead()).await.expect_err("must fail");
        assert!(matches!(error, FsmError::Provider { status: 503, .. }));
        assert!(client.leads().is_empty());
    }
}
