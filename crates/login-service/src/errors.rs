//! Login service error types.
//!
//! Every component returns `Result<_, AuthError>`. All errors map to HTTP
//! status codes via the `IntoResponse` impl. Messages returned to clients are
//! intentionally generic; provider payloads, claim values and secrets are
//! logged server-side at debug level only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Login service error type.
///
/// Maps to HTTP status codes:
/// - Unauthenticated: 401 Unauthorized
/// - CsrfMismatch, NonceMismatch, ProviderDenied, SignatureInvalid,
///   ClaimInvalid, KeyNotFound, ClockSkew, BadRequest: 400 Bad Request
/// - TokenExchangeFailed: 502 Bad Gateway
/// - UpstreamUnavailable: 503 Service Unavailable
/// - Internal: 500 Internal Server Error
///
/// `Clone` so a single JWKS refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Callback state does not match a pending login")]
    CsrfMismatch,

    #[error("Identity token nonce does not match the pending login")]
    NonceMismatch,

    #[error("Identity provider denied the request: {reason}")]
    ProviderDenied {
        reason: String,
        description: Option<String>,
    },

    #[error("Token exchange failed with status {status}")]
    TokenExchangeFailed { status: u16 },

    #[error("Identity provider unavailable (retryable: {retryable})")]
    UpstreamUnavailable { retryable: bool },

    #[error("Identity token signature is invalid")]
    SignatureInvalid,

    #[error("Identity token claim is invalid: {claim}")]
    ClaimInvalid { claim: &'static str },

    #[error("No signing key matches the identity token")]
    KeyNotFound,

    #[error("Identity token issued-at is beyond clock skew tolerance")]
    ClockSkew,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Unauthenticated => 401,
            AuthError::CsrfMismatch
            | AuthError::NonceMismatch
            | AuthError::ProviderDenied { .. }
            | AuthError::SignatureInvalid
            | AuthError::ClaimInvalid { .. }
            | AuthError::KeyNotFound
            | AuthError::ClockSkew
            | AuthError::BadRequest(_) => 400,
            AuthError::TokenExchangeFailed { .. } => 502,
            AuthError::UpstreamUnavailable { .. } => 503,
            AuthError::Internal => 500,
        }
    }

    /// Bounded label for the `error_type` metric dimension.
    pub fn error_type(&self) -> &'static str {
        match self {
            AuthError::CsrfMismatch => "csrf_mismatch",
            AuthError::NonceMismatch => "nonce_mismatch",
            AuthError::ProviderDenied { .. } => "provider_denied",
            AuthError::TokenExchangeFailed { .. } => "token_exchange_failed",
            AuthError::UpstreamUnavailable { .. } => "upstream_unavailable",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::ClaimInvalid { .. } => "claim_invalid",
            AuthError::KeyNotFound => "key_not_found",
            AuthError::ClockSkew => "clock_skew",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::BadRequest(_) => "bad_request",
            AuthError::Internal => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required".to_string(),
            ),
            AuthError::CsrfMismatch => (
                StatusCode::BAD_REQUEST,
                "INVALID_STATE",
                "The login request is invalid or has expired".to_string(),
            ),
            AuthError::NonceMismatch
            | AuthError::SignatureInvalid
            | AuthError::ClaimInvalid { .. }
            | AuthError::KeyNotFound
            | AuthError::ClockSkew => {
                tracing::debug!(target: "login.errors", error = %self, "Identity token rejected");
                (
                    StatusCode::BAD_REQUEST,
                    "INVALID_ID_TOKEN",
                    "The identity token is invalid".to_string(),
                )
            }
            AuthError::ProviderDenied {
                reason,
                description,
            } => {
                tracing::debug!(
                    target: "login.errors",
                    reason = %reason,
                    description = ?description,
                    "Provider denied login"
                );
                (
                    StatusCode::BAD_REQUEST,
                    "ACCESS_DENIED",
                    "The identity provider denied the login request".to_string(),
                )
            }
            AuthError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            AuthError::TokenExchangeFailed { status } => {
                tracing::warn!(target: "login.errors", upstream_status = status, "Token exchange failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "TOKEN_EXCHANGE_FAILED",
                    "Unable to complete login with the identity provider".to_string(),
                )
            }
            AuthError::UpstreamUnavailable { retryable } => {
                tracing::warn!(target: "login.availability", retryable = retryable, "Identity provider unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "UPSTREAM_UNAVAILABLE",
                    "Identity provider temporarily unavailable".to_string(),
                )
            }
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Session realm=\"gatehouse\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
