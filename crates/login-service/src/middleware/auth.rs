//! Session guards for protected routes.
//!
//! Reads the signed session cookie, resolves the session from the store, and
//! injects it into request extensions. The wrapped handler never runs
//! without a resolved session.
//!
//! Two flavours differ only in how an absent session is reported:
//!
//! - [`require_session_api`] - `401 Unauthorized` with `WWW-Authenticate`
//! - [`require_session_browser`] - `302 Found` to `/login?return_to=<path>`

use crate::errors::AuthError;
use crate::handlers::login::found;
use crate::routes::AppState;
use crate::stores::{Session, SessionHandle};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use std::sync::Arc;
use tracing::instrument;

/// Name of the cookie carrying the signed session handle.
pub const SESSION_COOKIE_NAME: &str = "gatehouse_session";

/// Path of the login entry point used by the browser guard.
const LOGIN_PATH: &str = "/login";

/// Session handle from a verified cookie jar.
///
/// A cookie whose signature does not verify is absent from the jar.
pub fn session_handle(jar: &SignedCookieJar) -> Option<SessionHandle> {
    jar.get(SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .map(SessionHandle::from_cookie_value)
}

async fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Arc<Session>>, AuthError> {
    let jar = SignedCookieJar::from_headers(headers, state.cookie_key.clone());
    match session_handle(&jar) {
        Some(handle) => state.sessions.get(&handle).await,
        None => Ok(None),
    }
}

/// Guard for API routes.
///
/// # Response
///
/// - Returns 401 Unauthorized if the cookie is missing, forged, or names no live session
/// - Continues to next handler with `Arc<Session>` in extensions otherwise
#[instrument(skip_all, name = "login.middleware.api_guard")]
pub async fn require_session_api(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let session = resolve_session(&state, req.headers())
        .await?
        .ok_or_else(|| {
            tracing::debug!(target: "login.middleware.auth", "API request without session");
            AuthError::Unauthenticated
        })?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Guard for browser routes.
///
/// An absent session sends the browser to the login entry point, carrying
/// the requested path so the user lands back on it after login.
#[instrument(skip_all, name = "login.middleware.browser_guard")]
pub async fn require_session_browser(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    match resolve_session(&state, req.headers()).await {
        Ok(Some(session)) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Ok(None) => {
            tracing::debug!(target: "login.middleware.auth", "Browser request without session");
            found(&login_redirect(req.uri()))
        }
        Err(e) => e.into_response(),
    }
}

/// `/login?return_to=<path and query>` for the requested URI.
fn login_redirect(uri: &Uri) -> String {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("{LOGIN_PATH}?return_to={encoded}")
}

/// Extension trait for reading the guarded session from a request.
pub trait SessionExt {
    /// Returns `None` if no session guard was applied to this request.
    fn session(&self) -> Option<&Arc<Session>>;
}

impl<B> SessionExt for axum::extract::Request<B> {
    fn session(&self) -> Option<&Arc<Session>> {
        self.extensions().get::<Arc<Session>>()
    }
}
