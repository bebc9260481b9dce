use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;
use crate::errors::OrchestrationError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MissedCall,
    InboundSms,
    WebLead,
    JobCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissedCall => "missed_call",
            Self::InboundSms => "inbound_sms",
            Self::WebLead => "web_lead",
            Self::JobCompleted => "job_completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "missed_call" => Some(Self::MissedCall),
            "inbound_sms" => Some(Self::InboundSms),
            "web_lead" => Some(Self::WebLead),
            "job_completed" => Some(Self::JobCompleted),
            _ => None,
        }
    }
}

/// Typed per-event payload. Free-form maps from the wire are deserialized
/// into exactly one of these variants before any orchestration runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    MissedCall {
        phone: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caller_name: Option<String>,
    },
    InboundSms {
        phone: String,
        body: String,
    },
    WebLead {
        phone: String,
        name: String,
        requested_service: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    JobCompleted {
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phone: Option<String>,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::MissedCall { .. } => EventType::MissedCall,
            Self::InboundSms { .. } => EventType::InboundSms,
            Self::WebLead { .. } => EventType::WebLead,
            Self::JobCompleted { .. } => EventType::JobCompleted,
        }
    }

    pub fn phone(&self) -> Option<&str> {
        match self {
            Self::MissedCall { phone, .. }
            | Self::InboundSms { phone, .. }
            | Self::WebLead { phone, .. } => Some(phone.as_str()),
            Self::JobCompleted { phone, .. } => phone.as_deref(),
        }
    }

    /// Boundary validation. Fails fast before a receipt or any other record
    /// is written.
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        let mut missing = Vec::new();
        match self {
            Self::MissedCall { phone, .. } => {
                if phone.trim().is_empty() {
                    missing.push("phone");
                }
            }
            Self::InboundSms { phone, body } => {
                if phone.trim().is_empty() {
                    missing.push("phone");
                }
                if body.trim().is_empty() {
                    missing.push("body");
                }
            }
            Self::WebLead { phone, name, requested_service, .. } => {
                if phone.trim().is_empty() {
                    missing.push("phone");
                }
                if name.trim().is_empty() {
                    missing.push("name");
                }
                if requested_service.trim().is_empty() {
                    missing.push("requested_service");
                }
            }
            Self::JobCompleted { job_id, .. } => {
                if job_id.trim().is_empty() {
                    missing.push("job_id");
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrchestrationError::Validation(format!(
                "{} event is missing required fields: {}",
                self.event_type().as_str(),
                missing.join(", ")
            )))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Processing,
    Completed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub payload: EventPayload,
    pub status: EventStatus,
    pub conversation_id: Option<ConversationId>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Processing,
    Completed,
    Failed,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Idempotency record keyed by the external event id. Uniqueness of
/// `event_id` is what makes retried deliveries safe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReceipt {
    pub event_id: EventId,
    pub status: ReceiptStatus,
    pub result: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EventReceipt {
    pub fn processing(event_id: EventId, now: DateTime<Utc>) -> Self {
        Self { event_id, status: ReceiptStatus::Processing, result: None, completed_at: None, created_at: now }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventPayload, EventStatus, EventType, ReceiptStatus};

    #[test]
    fn event_type_round_trips_from_storage_encoding() {
        for event_type in [
            EventType::MissedCall,
            EventType::InboundSms,
            EventType::WebLead,
            EventType::JobCompleted,
        ] {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::parse("voicemail"), None);
    }

    #[test]
    fn statuses_know_their_terminal_states() {
        assert!(!EventStatus::Processing.is_terminal());
        assert!(EventStatus::Completed.is_terminal());
        assert!(EventStatus::Failed.is_terminal());
        assert!(ReceiptStatus::Completed.is_terminal());
        assert!(!ReceiptStatus::Processing.is_terminal());
    }

    #[test]
    fn missed_call_payload_requires_phone() {
        let payload = EventPayload::MissedCall { phone: "  ".to_owned(), caller_name: None };
        let error = payload.validate().expect_err("blank phone must fail validation");
        assert!(error.to_string().contains("phone"));
    }

    #[test]
    fn web_lead_payload_reports_every_missing_field() {
        let payload = EventPayload::WebLead {
            phone: String::new(),
            name: String::new(),
            requested_service: "gutter cleaning".to_owned(),
            notes: None,
        };
        let error = payload.validate().expect_err("missing fields must fail validation");
        let message = error.to_string();
        assert!(message.contains("phone"));
        assert!(message.contains("name"));
        assert!(!message.contains("requested_service"));
    }

    #[test]
    fn inbound_sms_payload_carries_its_phone() {
        let payload =
            EventPayload::InboundSms { phone: "+15550100".to_owned(), body: "hi".to_owned() };
        assert!(payload.validate().is_ok());
        assert_eq!(payload.phone(), Some("+15550100"));
        assert_eq!(payload.event_type(), EventType::InboundSms);
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = EventPayload::MissedCall {
            phone: "+15550100".to_owned(),
            caller_name: Some("Dana".to_owned()),
        };
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["type"], "missed_call");
        assert_eq!(json["phone"], "+15550100");
    }
}
