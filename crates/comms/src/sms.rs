use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmsError {
    #[error("sms transport failed: {0}")]
    Transport(String),
    #[error("sms provider rejected the message ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("invalid recipient number: {0}")]
    InvalidRecipient(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmsReceipt {
    pub provider_message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundSms {
    pub to: String,
    pub body: String,
}

#[async_trait]
pub trait SmsDelivery: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SmsReceipt, SmsError>;
}

/// Outbound delivery through an HTTP SMS provider. Best effort: one request,
/// no retries; the step runner treats any error as a step failure.
pub struct HttpSmsDelivery {
    client: reqwest::Client,
    api_base_url: String,
    account_id: String,
    auth_token: SecretString,
    from_number: String,
}

#[derive(Debug, Deserialize)]
struct ProviderSendResponse {
    message_id: String,
}

impl HttpSmsDelivery {
    pub fn new(
        api_base_url: impl Into<String>,
        account_id: impl Into<String>,
        auth_token: SecretString,
        from_number: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, SmsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| SmsError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            account_id: account_id.into(),
            auth_token,
            from_number: from_number.into(),
        })
    }
}

#[async_trait]
impl SmsDelivery for HttpSmsDelivery {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SmsReceipt, SmsError> {
        if !to.starts_with('+') {
            return Err(SmsError::InvalidRecipient(to.to_owned()));
        }

        let url = format!("{}/accounts/{}/messages", self.api_base_url, self.account_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.auth_token.expose_secret())
            .json(&serde_json::json!({
                "from": self.from_number,
                "to": to,
                "body": body,
            }))
            .send()
            .await
            .map_err(|error| SmsError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SmsError::Provider { status: status.as_u16(), message });
        }

        let decoded: ProviderSendResponse = response
            .json()
            .await
            .map_err(|error| SmsError::Transport(format!("invalid provider response: {error}")))?;

        debug!(
            event_name = "comms.sms.sent",
            provider_message_id = %decoded.message_id,
            "outbound sms accepted by provider"
        );
        Ok(SmsReceipt { provider_message_id: decoded.message_id })
    }
}

/// Accepts everything without delivering anything. Used when sms.enabled is
/// false so local runs still complete their plans.
#[derive(Default)]
pub struct NoopSmsDelivery;

#[async_trait]
impl SmsDelivery for NoopSmsDelivery {
    async fn send_sms(&self, to: &str, _body: &str) -> Result<SmsReceipt, SmsError> {
        info!(event_name = "comms.sms.noop", to = %to, "sms delivery disabled; message dropped");
        Ok(SmsReceipt { provider_message_id: "noop".to_owned() })
    }
}

/// Test double: records accepted messages and can be told to fail the next
/// sends with a scripted error.
#[derive(Default)]
pub struct RecordingSmsDelivery {
    sent: Mutex<Vec<OutboundSms>>,
    fail_with: Mutex<Option<SmsError>>,
}

impl RecordingSmsDelivery {
    pub fn sent(&self) -> Vec<OutboundSms> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Every send from now on fails with `error` until cleared.
    pub fn fail_with(&self, error: SmsError) {
        if let Ok(mut fail) = self.fail_with.lock() {
            *fail = Some(error);
        }
    }

    pub fn clear_failure(&self) {
        if let Ok(mut fail) = self.fail_with.lock() {
            *fail = None;
        }
    }
}

#[async_trait]
impl SmsDelivery for RecordingSmsDelivery {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SmsReceipt, SmsError> {
        let failure = match self.fail_with.lock() {
            Ok(fail) => fail.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(error) = failure {
            return Err(error);
        }

        let message = OutboundSms { to: to.to_owned(), body: body.to_owned() };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(SmsReceipt { provider_message_id: format!("recorded-{}", uuid::Uuid::new_v4()) })
    }
}

#[cfg(test)]
mod tests {
    use super::{NoopSmsDelivery, OutboundSms, RecordingSmsDelivery, SmsDelivery, SmsError};

    #[tokio::test]
    async fn recording_delivery_captures_messages_in_order() {
        let delivery = RecordingSmsDelivery::default();
        delivery.send_sms("+15550100", "first").await.expect("send first");
        delivery.send_sms("+15550101", "second").await.expect("send second");

        assert_eq!(
            delivery.sent(),
            vec![
                OutboundSms { to: "+15550100".to_owned(), body: "first".to_owned() },
                OutboundSms { to: "+15550101".to_owned(), body: "second".to_owned() },
            ]
        );
    }

    #[tokio::test]
    async fn scripted_failure_blocks_sends_until_cleared() {
        let delivery = RecordingSmsDelivery::default();
        delivery.fail_with(SmsError::Provider { status: 502, message: "bad gateway".to_owned() });

        let error = delivery.send_sms("+15550100", "hi").await.expect_err("send must fail");
        assert!(matches!(error, SmsError::Provider { status: 502, .. }));
        assert!(delivery.sent().is_empty());

        delivery.clear_failure();
        delivery.send_sms("+15550100", "hi").await.expect("send succeeds after clearing");
        assert_eq!(delivery.sent().len(), 1);
    }

    #[tokio::test]
    async fn noop_delivery_acknowledges_without_sending() {
        let receipt = NoopSmsDelivery.send_sms("+15550100", "hi").await.expect("noop send");
        assert_eq!(receipt.provider_message_id, "noop");
    }
}
