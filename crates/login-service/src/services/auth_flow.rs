//! Authorization Code flow orchestration.
//!
//! Each login attempt moves `Idle -> PendingAuthorization` on
//! [`AuthFlow::begin_login`] and then either `-> Authenticated` or `-> Failed`
//! on [`AuthFlow::handle_callback`]. [`AuthFlow::logout`] ends an
//! authenticated session.
//!
//! # Security
//!
//! - `state` and `nonce` are fresh 256-bit CSPRNG values per attempt
//! - The pending request is consumed at lookup, so a replayed callback fails
//! - A session is created by a single insert after every check has passed
//! - Post-login redirects are restricted to local paths

use crate::auth::IdTokenVerifier;
use crate::config::ProviderConfig;
use crate::errors::AuthError;
use crate::observability::metrics;
use crate::services::endpoints::ProviderEndpoints;
use crate::services::token_client::TokenExchangeClient;
use crate::services::userinfo::UserInfoClient;
use crate::stores::{AuthorizationRequest, PendingLoginStore, Session, SessionHandle, SessionStore};
use chrono::Utc;
use common::random::{generate_token, DEFAULT_TOKEN_BYTES};
use common::secret::ExposeSecret;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Fallback post-login destination.
const DEFAULT_RETURN_TO: &str = "/";

/// Query parameters the provider appends to the callback URL.
#[derive(Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Debug for CallbackQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQuery")
            .field("code", &self.code.as_ref().map(|_| "[REDACTED]"))
            .field("state", &self.state.as_ref().map(|_| "[REDACTED]"))
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}

/// Result of a successful callback.
#[derive(Debug)]
pub struct CompletedLogin {
    pub session: Arc<Session>,

    /// Local path recorded at `begin_login`.
    pub return_to: String,
}

/// Relying-party side of the OIDC Authorization Code flow.
pub struct AuthFlow {
    provider: ProviderConfig,
    endpoints: ProviderEndpoints,
    pending: Arc<dyn PendingLoginStore>,
    sessions: Arc<dyn SessionStore>,
    token_client: TokenExchangeClient,
    verifier: IdTokenVerifier,
    userinfo: Option<UserInfoClient>,
    retain_tokens: bool,
}

impl AuthFlow {
    pub fn new(
        provider: ProviderConfig,
        endpoints: ProviderEndpoints,
        pending: Arc<dyn PendingLoginStore>,
        sessions: Arc<dyn SessionStore>,
        token_client: TokenExchangeClient,
        verifier: IdTokenVerifier,
    ) -> Self {
        if !provider.enforce_nonce {
            warn!(target: "login.flow", "Nonce enforcement is disabled; ID token replay is not detected");
        }

        Self {
            provider,
            endpoints,
            pending,
            sessions,
            token_client,
            verifier,
            userinfo: None,
            retain_tokens: true,
        }
    }

    /// Attach the UserInfo profile to new sessions.
    #[must_use]
    pub fn with_userinfo(mut self, client: UserInfoClient) -> Self {
        self.userinfo = Some(client);
        self
    }

    /// Whether raw tokens are kept inside sessions.
    #[must_use]
    pub fn with_token_retention(mut self, retain: bool) -> Self {
        self.retain_tokens = retain;
        self
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    /// Start a login attempt and return the provider authorize URL.
    ///
    /// The pending request is stored before the URL is returned.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if random generation or the store fails.
    #[instrument(skip_all)]
    pub async fn begin_login(&self, return_to: Option<&str>) -> Result<Url, AuthError> {
        let state = generate_token(DEFAULT_TOKEN_BYTES).map_err(|_| AuthError::Internal)?;
        let nonce = generate_token(DEFAULT_TOKEN_BYTES).map_err(|_| AuthError::Internal)?;

        let request = AuthorizationRequest {
            state: state.clone(),
            nonce: nonce.clone(),
            return_to: sanitize_return_to(return_to),
            created_at: Utc::now(),
        };
        self.pending.insert(request).await?;

        let mut url = self.endpoints.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.provider.client_id)
                .append_pair("response_type", "code")
                .append_pair("scope", &self.provider.scopes);
            if let Some(audience) = &self.provider.audience {
                query.append_pair("audience", audience);
            }
            query
                .append_pair("state", &state)
                .append_pair("nonce", &nonce)
                .append_pair("redirect_uri", &self.provider.callback_url);
        }

        metrics::record_login_started();
        debug!(target: "login.flow", "Login started");
        Ok(url)
    }

    /// Complete a login attempt from the provider's callback.
    ///
    /// # Errors
    ///
    /// - `CsrfMismatch` if `state` is missing, unknown, expired or already used
    /// - `ProviderDenied` if the provider returned an `error`
    /// - `BadRequest` if neither `code` nor `error` is present
    /// - Token exchange and verification errors as returned by those components
    /// - `NonceMismatch` if the ID token nonce differs from the pending one
    #[instrument(skip_all)]
    pub async fn handle_callback(&self, query: CallbackQuery) -> Result<CompletedLogin, AuthError> {
        let start = Instant::now();
        let result = self.complete_callback(query).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.error_type(),
        };
        metrics::record_callback(outcome, start.elapsed());

        result
    }

    async fn complete_callback(&self, query: CallbackQuery) -> Result<CompletedLogin, AuthError> {
        let state = query.state.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| {
            debug!(target: "login.flow", "Callback without state");
            AuthError::CsrfMismatch
        })?;

        let pending = self.pending.take(state).await?.ok_or_else(|| {
            warn!(target: "login.flow", "Callback state does not match a pending login");
            AuthError::CsrfMismatch
        })?;

        if let Some(reason) = query.error {
            info!(target: "login.flow", reason = %reason, "Provider denied login");
            return Err(AuthError::ProviderDenied {
                reason,
                description: query.error_description,
            });
        }

        let code = query
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::BadRequest("Missing authorization code".to_string()))?;

        let tokens = self
            .token_client
            .exchange(&code, &self.provider.callback_url)
            .await?;

        let id_token = tokens.id_token.as_ref().ok_or_else(|| {
            warn!(target: "login.flow", "Token response did not include an id_token");
            AuthError::TokenExchangeFailed { status: 200 }
        })?;

        let claims = self
            .verifier
            .verify(
                id_token.expose_secret(),
                &self.provider.client_id,
                &self.provider.issuer,
            )
            .await?;

        if self.provider.enforce_nonce && claims.nonce.as_deref() != Some(pending.nonce.as_str()) {
            warn!(target: "login.flow", "ID token nonce mismatch");
            return Err(AuthError::NonceMismatch);
        }

        let profile = match &self.userinfo {
            Some(client) => {
                let profile = client.fetch(&tokens.access_token).await?;
                if profile.sub != claims.sub {
                    warn!(target: "login.flow", "UserInfo subject differs from ID token subject");
                    return Err(AuthError::ClaimInvalid { claim: "sub" });
                }
                Some(profile)
            }
            None => None,
        };

        let tokens = self.retain_tokens.then_some(tokens);
        let session = self.sessions.create(claims, tokens, profile).await?;

        info!(target: "login.flow", "Login completed");
        Ok(CompletedLogin {
            session,
            return_to: pending.return_to,
        })
    }

    /// End a session and return the provider logout URL.
    ///
    /// The local session is destroyed before the URL is built. `returnTo` is
    /// omitted when no post-logout URL is configured.
    ///
    /// # Errors
    ///
    /// Returns the session store's error if the session cannot be removed.
    #[instrument(skip_all)]
    pub async fn logout(&self, handle: Option<&SessionHandle>) -> Result<Url, AuthError> {
        if let Some(handle) = handle {
            self.sessions.destroy(handle).await?;
        }

        let mut url = self.endpoints.end_session_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(return_to) = &self.provider.post_logout_redirect_url {
                query.append_pair("returnTo", return_to);
            }
            query.append_pair("client_id", &self.provider.client_id);
        }

        metrics::record_logout(handle.is_some());
        debug!(target: "login.flow", had_session = handle.is_some(), "Logged out");
        Ok(url)
    }
}

/// Keep only local absolute paths; anything else becomes `/`.
pub fn sanitize_return_to(return_to: Option<&str>) -> String {
    match return_to {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        Some(path) => {
            debug!(target: "login.flow", return_to = %path, "Rejected non-local return_to");
            DEFAULT_RETURN_TO.to_string()
        }
        None => DEFAULT_RETURN_TO.to_string(),
    }
}
