//! HTTP surface for event ingress and the operator approval inbox. The UI
//! layers consuming these endpoints are external; this module only maps the
//! engine's outcomes and errors onto status codes and JSON envelopes.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use leadline_core::domain::action::PendingAction;
use leadline_core::domain::event::{Event, EventPayload};
use leadline_core::errors::{InterfaceError, OrchestrationError};
use leadline_engine::{Engine, EventRequest};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/events", post(ingest_event).get(list_events))
        .route("/actions", get(list_pending_actions))
        .route("/actions/{action_id}/approve", post(approve_action))
        .route("/actions/{action_id}/reject", post(reject_action))
        .with_state(ApiState { engine })
}

#[derive(Debug, Deserialize)]
pub struct IngressBody {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub event_id: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct IngressResponse {
    pub success: bool,
    pub message: String,
    pub conversation_id: Option<String>,
    pub event_id: String,
    pub stopped_for_approval: bool,
}

#[derive(Debug, Serialize)]
pub struct EventFeedItem {
    pub id: String,
    pub event_type: &'static str,
    pub status: &'static str,
    pub error: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct PendingActionView {
    pub id: String,
    pub conversation_id: String,
    pub action_type: &'static str,
    pub description: String,
    pub status: &'static str,
    pub resolved_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveBody {
    pub resolved_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub async fn ingest_event(
    State(state): State<ApiState>,
    Json(body): Json<IngressBody>,
) -> ApiResult<IngressResponse> {
    let correlation_id = body.event_id.clone().unwrap_or_else(|| "ingress".to_owned());
    let outcome = state
        .engine
        .handle_event(EventRequest { payload: body.payload, event_id: body.event_id })
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok(Json(IngressResponse {
        success: outcome.success,
        message: outcome.message,
        conversation_id: outcome.conversation_id.map(|id| id.0),
        event_id: outcome.event_id.0,
        stopped_for_approval: outcome.stopped_for_approval,
    }))
}

pub async fn list_events(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<EventFeedItem>> {
    let events = state
        .engine
        .recent_events(query.limit.unwrap_or(50).min(500))
        .await
        .map_err(|error| reject(error, "event-feed"))?;

    Ok(Json(events.into_iter().map(feed_item).collect()))
}

pub async fn list_pending_actions(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<PendingActionView>> {
    let actions = state
        .engine
        .pending_actions(query.limit.unwrap_or(50).min(500))
        .await
        .map_err(|error| reject(error, "approval-inbox"))?;

    Ok(Json(actions.into_iter().map(action_view).collect()))
}

pub async fn approve_action(
    State(state): State<ApiState>,
    Path(action_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> ApiResult<PendingActionView> {
    let resolved_by = body.resolved_by.unwrap_or_else(|| "operator".to_owned());
    let action = state
        .engine
        .approve_action(&action_id, &resolved_by, body.notes)
        .await
        .map_err(|error| reject(error, &action_id))?;

    Ok(Json(action_view(action)))
}

pub async fn reject_action(
    State(state): State<ApiState>,
    Path(action_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> ApiResult<PendingActionView> {
    let resolved_by = body.resolved_by.unwrap_or_else(|| "operator".to_owned());
    let action = state
        .engine
        .reject_action(&action_id, &resolved_by, body.notes)
        .await
        .map_err(|error| reject(error, &action_id))?;

    Ok(Json(action_view(action)))
}

fn feed_item(event: Event) -> EventFeedItem {
    EventFeedItem {
        id: event.id.0,
        event_type: event.event_type.as_str(),
        status: event.status.as_str(),
        error: event.error,
        created_at: event.created_at.to_rfc3339(),
    }
}

fn action_view(action: PendingAction) -> PendingActionView {
    PendingActionView {
        id: action.id.0,
        conversation_id: action.conversation_id.0,
        action_type: action.action_type.as_str(),
        description: action.description,
        status: action.status.as_str(),
        resolved_by: action.resolved_by,
        notes: action.notes,
        created_at: action.created_at.to_rfc3339(),
    }
}

fn reject(error: OrchestrationError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ApiError {
            error: interface.user_message().to_owned(),
            correlation_id: correlation_id.to_owned(),
        }),
    )
}
