//! HTTP routes for the login service.
//!
//! Defines the Axum router and application state.

use crate::auth::{IdTokenVerifier, JwksClient};
use crate::config::Config;
use crate::errors::AuthError;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_session_api, require_session_browser};
use crate::services::{
    build_http_client, AuthFlow, ProtectedApiClient, ProviderEndpoints, TokenExchangeClient,
    UserInfoClient,
};
use crate::stores::{
    InMemoryPendingLoginStore, InMemorySessionStore, PendingLoginStore, SessionStore,
};
use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::Key;
use common::secret::ExposeSecret;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Whole-request timeout. Covers a callback's token exchange retries.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Arc<Config>,

    /// Login flow orchestration.
    pub auth_flow: Arc<AuthFlow>,

    /// Pending logins (also held by `auth_flow`).
    pub pending: Arc<dyn PendingLoginStore>,

    /// Sessions (also held by `auth_flow`).
    pub sessions: Arc<dyn SessionStore>,

    /// Signing key for the session cookie.
    pub cookie_key: Key,

    /// Downstream API called with the session's access token, if configured.
    pub api_client: Option<Arc<ProtectedApiClient>>,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl AppState {
    /// Build state with in-memory stores, resolving provider endpoints.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the HTTP client cannot be built or endpoint
    /// discovery fails.
    pub async fn from_config(config: Config) -> Result<Self, AuthError> {
        let http_client = build_http_client(config.http_timeout)?;
        let endpoints = ProviderEndpoints::resolve(&config.provider, &http_client).await?;

        let pending: Arc<dyn PendingLoginStore> =
            Arc::new(InMemoryPendingLoginStore::new(config.pending_login_ttl));
        let sessions: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::new(config.session_ttl));

        Self::with_stores(config, endpoints, http_client, pending, sessions)
    }

    /// Build state around already-resolved endpoints and store backends.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the session secret is not a usable key.
    pub fn with_stores(
        config: Config,
        endpoints: ProviderEndpoints,
        http_client: reqwest::Client,
        pending: Arc<dyn PendingLoginStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, AuthError> {
        let cookie_key = Key::try_from(config.session_secret.expose_secret().as_bytes())
            .map_err(|e| {
                tracing::error!(target: "login.routes", error = %e, "Unusable session secret");
                AuthError::Internal
            })?;

        let token_client = TokenExchangeClient::new(
            http_client.clone(),
            endpoints.token_endpoint.clone(),
            config.provider.client_id.clone(),
            config.provider.client_secret.clone(),
            config.max_retries,
        );
        let jwks_client = Arc::new(JwksClient::new(
            endpoints.jwks_uri.to_string(),
            http_client.clone(),
            config.jwks_cache_ttl,
        ));
        let verifier = IdTokenVerifier::new(jwks_client, config.jwt_clock_skew);

        let api_client = config
            .api_url
            .clone()
            .map(|url| Arc::new(ProtectedApiClient::new(http_client.clone(), url)));

        let userinfo = match (&endpoints.userinfo_endpoint, config.fetch_userinfo) {
            (Some(endpoint), true) => Some(UserInfoClient::new(http_client, endpoint.clone())),
            (None, true) => {
                tracing::warn!(
                    target: "login.routes",
                    "UserInfo requested but provider has no userinfo endpoint"
                );
                None
            }
            (_, false) => None,
        };

        let mut auth_flow = AuthFlow::new(
            config.provider.clone(),
            endpoints,
            pending.clone(),
            sessions.clone(),
            token_client,
            verifier,
        )
        .with_token_retention(config.session_retain_tokens);
        if let Some(client) = userinfo {
            auth_flow = auth_flow.with_userinfo(client);
        }

        Ok(Self {
            config: Arc::new(config),
            auth_flow: Arc::new(auth_flow),
            pending,
            sessions,
            cookie_key,
            api_client,
        })
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness check - public
/// - `/metrics` - Prometheus metrics - public
/// - `/login`, `/callback`, `/logout` - Login flow - public
/// - `/dashboard` - Profile page - browser guard (redirects to `/login`)
/// - `/api/me` - Session claims - API guard (401)
/// - `POST /api/call` - Downstream API call - API guard, only when `API_URL` is set
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/login", get(handlers::login))
        .route("/callback", get(handlers::callback))
        .route("/logout", get(handlers::logout))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let browser_routes = Router::new()
        .route("/dashboard", get(handlers::dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session_browser,
        ));

    let mut api_routes = Router::new().route("/api/me", get(handlers::get_me));
    if state.api_client.is_some() {
        api_routes = api_routes.route("/api/call", post(handlers::call_api));
    }
    let api_routes = api_routes
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session_api,
        ))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(browser_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(http_metrics_middleware))
}
