//! Calls to the protected downstream API on behalf of the session.

use crate::errors::AuthError;
use crate::models::ApiCallResponse;
use crate::routes::AppState;
use crate::stores::Session;
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /api/call (API guard)
///
/// Forwards the session's access token as a bearer credential to `API_URL`
/// and relays the upstream status and body.
///
/// ## Response
///
/// ```json
/// { "status": 200, "body": "{\"message\":\"pong\"}" }
/// ```
#[instrument(skip_all, name = "login.handlers.api_call")]
pub async fn call_api(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<Session>>,
) -> Result<Json<ApiCallResponse>, AuthError> {
    let Some(client) = state.api_client.as_ref() else {
        tracing::error!(target: "login.handlers.api", "API call route hit without API_URL");
        return Err(AuthError::Internal);
    };

    let access_token = usable_access_token(&session, Utc::now())?;
    let response = client.call(access_token).await?;

    Ok(Json(ApiCallResponse::from(response)))
}

/// The session's access token, unless none was retained or it has expired.
fn usable_access_token(
    session: &Session,
    now: DateTime<Utc>,
) -> Result<&SecretString, AuthError> {
    let Some(tokens) = session.tokens.as_ref() else {
        tracing::debug!(target: "login.handlers.api", "Session holds no access token");
        return Err(AuthError::Unauthenticated);
    };

    if tokens.expires_at.is_some_and(|expires_at| expires_at <= now) {
        tracing::debug!(target: "login.handlers.api", "Access token has expired");
        return Err(AuthError::Unauthenticated);
    }

    Ok(&tokens.access_token)
}
