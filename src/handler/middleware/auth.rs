use crate::{app::AppState, error::CallError, user::User};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::debug;

/// The requesting user, if the request carries a valid bearer token for a
/// known user. Handlers decide whether anonymity is acceptable.
pub struct AuthUser(pub Option<User>);

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = CallError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let Some(token) = extract_bearer_token(&parts.headers) else {
            return Ok(AuthUser(None));
        };
        let Some(user_id) = state.signer.verify(&token) else {
            debug!("rejected bearer token");
            return Ok(AuthUser(None));
        };
        let user = state
            .users
            .find_by_id(&user_id)
            .await
            .map_err(CallError::internal)?;
        if user.is_none() {
            debug!(user_id, "token for unknown user");
        }
        Ok(AuthUser(user))
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
