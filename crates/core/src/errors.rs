use thiserror::Error;

use crate::domain::action::{ActionStatus, PendingActionId};
use crate::domain::conversation::ConversationStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid conversation transition from {from:?} to {to:?}")]
    InvalidConversationTransition { from: ConversationStatus, to: ConversationStatus },
    #[error("pending action {id} already resolved as {status:?}")]
    ActionAlreadyResolved { id: PendingActionId, status: ActionStatus },
    #[error("pending action not found: {0}")]
    ActionNotFound(PendingActionId),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("event validation failed: {0}")]
    Validation(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("external tool failure during {operation}: {message}")]
    Tool { operation: String, message: String },
    #[error("agent adapter failure: {0}")]
    Agent(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The event could not be processed. Check required fields and try again."
            }
            Self::Conflict { .. } => "This approval was already resolved.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl OrchestrationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<OrchestrationError> for InterfaceError {
    fn from(value: OrchestrationError) -> Self {
        match value {
            OrchestrationError::Validation(message) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            OrchestrationError::Domain(DomainError::ActionAlreadyResolved { id, status }) => {
                Self::Conflict {
                    message: format!("action {} already resolved as {}", id.0, status.as_str()),
                    correlation_id: "unassigned".to_owned(),
                }
            }
            OrchestrationError::Domain(DomainError::ActionNotFound(id)) => Self::NotFound {
                message: format!("no pending action with id {}", id.0),
                correlation_id: "unassigned".to_owned(),
            },
            OrchestrationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            OrchestrationError::Persistence(message) | OrchestrationError::Tool { message, .. } => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            OrchestrationError::Agent(message) | OrchestrationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::action::{ActionStatus, PendingActionId};
    use crate::errors::{DomainError, InterfaceError, OrchestrationError};

    #[test]
    fn validation_error_maps_to_bad_request_with_correlation_id() {
        let interface = OrchestrationError::Validation("missing field `phone`".to_owned())
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The event could not be processed. Check required fields and try again."
        );
    }

    #[test]
    fn already_resolved_maps_to_conflict() {
        let interface = OrchestrationError::from(DomainError::ActionAlreadyResolved {
            id: PendingActionId("act-7".to_owned()),
            status: ActionStatus::Approved,
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.user_message(), "This approval was already resolved.");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = OrchestrationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn tool_error_maps_to_service_unavailable() {
        let interface = OrchestrationError::Tool {
            operation: "sms.send".to_owned(),
            message: "provider returned 502".to_owned(),
        }
        .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn unknown_action_maps_to_not_found() {
        let interface =
            OrchestrationError::from(DomainError::ActionNotFound(PendingActionId("x".to_owned())))
                .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.user_message(), "The requested record does not exist.");
    }
}
