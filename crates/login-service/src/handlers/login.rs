//! Login, callback and logout handlers.
//!
//! Thin HTTP adapters over [`AuthFlow`](crate::services::AuthFlow). The only
//! browser-visible state is the signed session cookie.

use crate::errors::AuthError;
use crate::middleware::auth::{session_handle, SESSION_COOKIE_NAME};
use crate::routes::AppState;
use crate::services::CallbackQuery;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use serde::Deserialize;
use tracing::instrument;

/// Query for `GET /login`.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Local path to return to after login.
    #[serde(default)]
    pub return_to: Option<String>,
}

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn session_cookie(handle: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, handle.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Handler for GET /login
///
/// Redirects to the provider's authorize endpoint.
#[instrument(skip_all, name = "login.handlers.login")]
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, AuthError> {
    let url = state.auth_flow.begin_login(query.return_to.as_deref()).await?;
    Ok(found(url.as_str()))
}

/// Handler for GET /callback
///
/// On success sets the session cookie and redirects to the path recorded at
/// login. Any session the browser already held is destroyed first.
#[instrument(skip_all, name = "login.handlers.callback")]
pub async fn callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<(SignedCookieJar, Response), AuthError> {
    // The presented session ends before any new one is created
    if let Some(previous) = session_handle(&jar) {
        state.sessions.destroy(&previous).await?;
    }

    let completed = state.auth_flow.handle_callback(query).await?;

    let cookie = session_cookie(
        completed.session.handle.as_str(),
        state.config.session_cookie_secure,
    );
    Ok((jar.add(cookie), found(&completed.return_to)))
}

/// Handler for GET /logout
///
/// Clears the local session and cookie, then redirects to the provider's
/// logout endpoint.
#[instrument(skip_all, name = "login.handlers.logout")]
pub async fn logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Response), AuthError> {
    let handle = session_handle(&jar);
    let url = state.auth_flow.logout(handle.as_ref()).await?;

    let jar = jar.remove(Cookie::build(SESSION_COOKIE_NAME).path("/"));
    Ok((jar, found(url.as_str())))
}
