//! Session-guarded handlers.
//!
//! Both read the `Arc<Session>` injected by the session guards.

use crate::models::{MeResponse, ProfileResponse};
use crate::stores::Session;
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /dashboard (browser guard)
///
/// ## Response
///
/// ```json
/// { "sub": "auth0|123", "name": "Ada Lovelace", "picture": "https://..." }
/// ```
#[instrument(skip_all, name = "login.handlers.dashboard")]
pub async fn dashboard(Extension(session): Extension<Arc<Session>>) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(session.as_ref()))
}

/// Handler for GET /api/me (API guard)
///
/// Returns the verified claims bound to the session.
#[instrument(skip_all, name = "login.handlers.me")]
pub async fn get_me(Extension(session): Extension<Arc<Session>>) -> Json<MeResponse> {
    tracing::debug!(target: "login.handlers.me", "Returning session claims");
    Json(MeResponse::from(session.as_ref()))
}
