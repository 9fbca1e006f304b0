use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("user has no callback phone number")]
    MissingCallbackNumber,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("audio file is required")]
    MissingFile,
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("friendlyName and category are required")]
    MissingFields,
    #[error("invalid category: {0}")]
    InvalidCategory(String),
    #[error("invalid call direction: {0}")]
    InvalidDirection(String),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("an asset with this name or link already exists")]
    DuplicateAsset,
    #[error("{0} not found")]
    NotFound(String),
    #[error("no audio files found for category: {0}")]
    AudioCategoryEmpty(String),
    #[error("no ongoing calls found")]
    NoOngoingCalls,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CallResult<T> = Result<T, CallError>;

impl CallError {
    pub fn provider(err: anyhow::Error) -> Self {
        CallError::Provider(format!("{:#}", err))
    }

    pub fn internal(err: anyhow::Error) -> Self {
        CallError::Internal(format!("{:#}", err))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CallError::MissingCallbackNumber
            | CallError::MissingField(_)
            | CallError::MissingFile
            | CallError::UnsupportedFormat(_)
            | CallError::MissingFields
            | CallError::InvalidCategory(_)
            | CallError::InvalidDirection(_)
            | CallError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            CallError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CallError::NotFound(_)
            | CallError::AudioCategoryEmpty(_)
            | CallError::NoOngoingCalls => StatusCode::NOT_FOUND,
            CallError::DuplicateAsset => StatusCode::CONFLICT,
            CallError::Provider(_) | CallError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CallError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
