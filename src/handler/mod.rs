use crate::app::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

const UPLOAD_LIMIT_BYTES: usize = 25 * 1024 * 1024;

pub mod asset;
pub mod call;
pub mod middleware;
#[cfg(test)]
mod tests;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/make-call", post(call::make_call))
        .route("/end-call", post(call::end_call))
        .route(
            "/status",
            get(call::status_event_query).post(call::status_event_form),
        )
        .route("/twilioLogs", get(call::provider_logs))
        .route("/outboundCallLogs", get(call::outbound_call_logs))
        .route("/customlogs", get(call::custom_call_logs))
        .route("/userbyid/{id}", get(call::user_by_id))
        .route(
            "/upload",
            post(asset::upload).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/play-audio/{category}", get(asset::play_audio))
        .route("/assets/{category}", get(asset::list_assets))
}
