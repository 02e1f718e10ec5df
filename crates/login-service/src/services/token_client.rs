//! Authorization code exchange against the provider's token endpoint.
//!
//! # Security
//!
//! - The client secret is only exposed to the form body of this request
//! - Token values are held in `SecretString` and never logged
//! - Error response bodies are logged at trace level only
//!
//! # Retries
//!
//! Transient failures (5xx, timeout, connect failure) are retried with
//! bounded exponential backoff. 4xx responses are never retried.

use crate::errors::AuthError;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};
use url::Url;

/// Initial backoff delay between attempts.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

/// Maximum backoff delay between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Tokens returned by a successful exchange.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: SecretString,
    pub id_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    /// Absolute access token expiry, when the provider sent `expires_in`.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Token endpoint response body.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: SecretString,
    #[serde(default)]
    id_token: Option<SecretString>,
    #[serde(default)]
    refresh_token: Option<SecretString>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token_set(self, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            scope: self.scope,
            expires_at: self.expires_in.and_then(|secs| expiry_from(now, secs)),
        }
    }
}

/// Absolute expiry for a relative `expires_in`.
///
/// Negative or unrepresentable lifetimes are dropped rather than trusted.
fn expiry_from(now: DateTime<Utc>, expires_in: i64) -> Option<DateTime<Utc>> {
    if expires_in < 0 {
        return None;
    }
    let expiry = chrono::Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime));
    if expiry.is_none() {
        warn!(target: "login.services.token", expires_in = expires_in, "Ignoring out-of-range expires_in");
    }
    expiry
}

/// Client for the authorization-code-for-tokens exchange.
pub struct TokenExchangeClient {
    http_client: reqwest::Client,
    token_endpoint: Url,
    client_id: String,
    client_secret: SecretString,
    max_retries: u32,
    initial_backoff: Duration,
}

impl TokenExchangeClient {
    /// Create a new token exchange client.
    ///
    /// # Arguments
    ///
    /// * `http_client` - Client with the configured upstream timeout
    /// * `token_endpoint` - Provider token endpoint
    /// * `client_id` / `client_secret` - Relying party credentials
    /// * `max_retries` - Extra attempts for transient failures
    pub fn new(
        http_client: reqwest::Client,
        token_endpoint: Url,
        client_id: String,
        client_secret: SecretString,
        max_retries: u32,
    ) -> Self {
        Self {
            http_client,
            token_endpoint,
            client_id,
            client_secret,
            max_retries,
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    /// Override the initial backoff delay.
    #[must_use]
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenExchangeFailed { status }` for non-2xx or unparseable responses
    /// - `AuthError::UpstreamUnavailable { retryable }` for network failures and timeouts
    #[instrument(skip_all)]
    pub async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, AuthError> {
        let start = Instant::now();
        let mut backoff = self.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.exchange_once(code, redirect_uri).await {
                Ok(tokens) => {
                    metrics::record_token_exchange("success", attempt, start.elapsed());
                    return Ok(tokens);
                }
                Err(e) if is_transient(&e) && attempt <= self.max_retries => {
                    warn!(
                        target: "login.services.token",
                        error = %e,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Token exchange failed, will retry"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => {
                    metrics::record_token_exchange("error", attempt, start.elapsed());
                    return Err(e);
                }
            }
        }
    }

    async fn exchange_once(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, AuthError> {
        debug!(
            target: "login.services.token",
            client_id = %self.client_id,
            url = %self.token_endpoint,
            "Requesting tokens from provider"
        );

        let form_body = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(self.token_endpoint.clone())
            .header("Accept", "application/json")
            .form(&form_body)
            .send()
            .await
            .map_err(|e| {
                debug!(target: "login.services.token", error = %e, "HTTP request failed");
                network_error(&e)
            })?;

        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await.map_err(|e| {
                debug!(target: "login.services.token", error = %e, "Failed to read token response");
                network_error(&e)
            })?;

            let token_response: TokenResponse = serde_json::from_slice(&body).map_err(|e| {
                warn!(target: "login.services.token", error = %e, "Failed to parse token response");
                AuthError::TokenExchangeFailed {
                    status: status.as_u16(),
                }
            })?;

            debug!(
                target: "login.services.token",
                has_id_token = token_response.id_token.is_some(),
                expires_in_secs = ?token_response.expires_in,
                "Tokens acquired"
            );

            return Ok(token_response.into_token_set(Utc::now()));
        }

        // Body may carry provider error details; keep it out of normal logs
        let body = response.text().await.unwrap_or_else(|e| {
            trace!(target: "login.services.token", error = %e, "Failed to read error response body");
            "<failed to read body>".to_string()
        });

        if status.is_server_error() {
            warn!(target: "login.services.token", status = %status, "Provider returned server error");
        } else {
            warn!(target: "login.services.token", status = %status, "Token exchange rejected by provider");
        }
        trace!(target: "login.services.token", body = %body, "Token error response body");

        Err(AuthError::TokenExchangeFailed {
            status: status.as_u16(),
        })
    }
}

fn network_error(e: &reqwest::Error) -> AuthError {
    AuthError::UpstreamUnavailable {
        retryable: e.is_timeout() || e.is_connect(),
    }
}

/// Whether another attempt may succeed.
fn is_transient(error: &AuthError) -> bool {
    match error {
        AuthError::UpstreamUnavailable { retryable } => *retryable,
        AuthError::TokenExchangeFailed { status } => *status >= 500,
        _ => false,
    }
}
