use super::middleware::auth::AuthUser;
use crate::{
    app::AppState,
    call::{session::DEFAULT_PROVIDER_LOG_LIMIT, PlaceCallRequest},
    error::{CallError, CallResult},
};
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Status event posted by the provider. Only the fields used here are read.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusEvent {
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
    pub call_duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

pub async fn make_call(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    request: Result<Json<PlaceCallRequest>, JsonRejection>,
) -> CallResult<Json<Value>> {
    // identity first, then the body
    let user = user.ok_or(CallError::Unauthenticated)?;
    let Json(request) = request.map_err(|e| CallError::InvalidBody(e.body_text()))?;
    let record = state.sessions.place_call(Some(&user), request).await?;
    Ok(Json(json!({
        "message": "Call initiated successfully",
        "callRecord": record,
    })))
}

pub async fn end_call(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> CallResult<Json<Value>> {
    let record = state.sessions.end_call(user.as_ref()).await?;
    Ok(Json(json!({
        "message": "Call ended successfully",
        "callSid": record.call_sid,
    })))
}

async fn apply_status_event(state: &AppState, event: StatusEvent) {
    let (Some(call_id), Some(status)) = (event.call_sid, event.call_status) else {
        warn!("status event without CallSid or CallStatus ignored");
        return;
    };
    let duration = event
        .call_duration
        .as_deref()
        .and_then(|d| d.trim().parse::<u64>().ok());
    info!(call_id, status, "status event received");
    state.sessions.on_webhook(&call_id, &status, duration).await;
}

pub async fn status_event_query(
    State(state): State<AppState>,
    event: Result<Query<StatusEvent>, QueryRejection>,
) -> StatusCode {
    match event {
        Ok(Query(event)) => apply_status_event(&state, event).await,
        Err(e) => warn!("malformed status event: {}", e),
    }
    StatusCode::OK
}

pub async fn status_event_form(
    State(state): State<AppState>,
    event: Result<Form<StatusEvent>, FormRejection>,
) -> StatusCode {
    match event {
        Ok(Form(event)) => apply_status_event(&state, event).await,
        Err(e) => warn!("malformed status event: {}", e),
    }
    StatusCode::OK
}

pub async fn provider_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> CallResult<Json<Value>> {
    let limit = query.limit.unwrap_or(DEFAULT_PROVIDER_LOG_LIMIT);
    let calls = state.sessions.provider_logs(limit).await?;
    Ok(Json(json!({ "calls": calls })))
}

pub async fn outbound_call_logs(State(state): State<AppState>) -> CallResult<Json<Value>> {
    let records = state.sessions.list_outbound().await?;
    Ok(Json(json!({ "data": records })))
}

pub async fn custom_call_logs(State(state): State<AppState>) -> CallResult<Json<Value>> {
    let records = state.sessions.list_all().await?;
    Ok(Json(json!({ "callLogs": records })))
}

pub async fn user_by_id(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.users.find_by_id(&id).await {
        Ok(Some(user)) => Json(json!({ "user": user })).into_response(),
        Ok(None) => CallError::NotFound(format!("user {}", id)).into_response(),
        Err(e) => CallError::internal(e).into_response(),
    }
}
