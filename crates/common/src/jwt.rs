//! JWT utilities shared across Gatehouse components.
//!
//! This module provides the pre-verification pieces of ID token handling:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Header parsing (algorithm + key ID) without signature verification
//! - Algorithm classification (symmetric algorithms are never accepted)
//! - iat validation logic
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Header values are only used to select a key from a trusted JWKS;
//!   the token MUST still be verified afterwards
//! - Error messages are generic; details are logged at debug level
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{parse_header, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! let header = parse_header(token)?;
//! if header.is_symmetric() {
//!     return Err(...);
//! }
//! // look up header.kid in the JWKS, verify the signature, then:
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (16KB).
///
/// ID tokens carry profile claims (name, picture URL, email) and are larger
/// than bare access tokens, but anything past 16KB is rejected before any
/// base64 decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 16_384;

/// Default clock skew tolerance for the `iat` claim (60 seconds).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Maximum configurable clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// HMAC family algorithms. A relying party verifying provider-issued tokens
/// against a public JWKS must never accept these.
const SYMMETRIC_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT before verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The identity token is invalid")]
    TokenTooLarge,

    /// Token format is invalid (not a valid compact JWS).
    #[error("The identity token is invalid")]
    MalformedToken,

    /// Token `iat` claim is too far in the future.
    #[error("The identity token is invalid")]
    IatTooFarInFuture,
}

// =============================================================================
// Header
// =============================================================================

/// The parts of a JOSE header used for key selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm as written in the header (e.g. `RS256`).
    pub alg: String,

    /// Key ID, if present. Empty strings are normalized to `None`.
    #[serde(default)]
    pub kid: Option<String>,
}

impl TokenHeader {
    /// Whether the header names a shared-secret (HMAC) algorithm.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        SYMMETRIC_ALGORITHMS.contains(&self.alg.as_str())
    }

    /// Whether the header claims the token is unsigned.
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        self.alg.eq_ignore_ascii_case("none")
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Parse the JOSE header of a compact JWT without verifying the signature.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - not three dot-separated parts, bad base64, or bad JSON
pub fn parse_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let mut header: TokenHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    if header.kid.as_deref().is_some_and(str::is_empty) {
        header.kid = None;
    }

    Ok(header)
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is more than
/// `clock_skew` ahead of the current time.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_iat`] in production code. This variant exists so that
/// boundary conditions can be tested without wall-clock dependence.
///
/// # Errors
///
/// Same as [`validate_iat`].
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    // clock_skew is bounded to MAX_CLOCK_SKEW by configuration
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    #[test]
    fn test_default_clock_skew_is_60_seconds() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(60));
    }

    #[test]
    fn test_max_clock_skew_is_10_minutes() {
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // parse_header
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_header_rs256_with_kid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"key-1"}"#);

        let header = parse_header(&token).unwrap();
        assert_eq!(header.alg, "RS256");
        assert_eq!(header.kid.as_deref(), Some("key-1"));
        assert!(!header.is_symmetric());
    }

    #[test]
    fn test_parse_header_without_kid() {
        let token = token_with_header(r#"{"alg":"EdDSA"}"#);

        let header = parse_header(&token).unwrap();
        assert!(header.kid.is_none());
    }

    #[test]
    fn test_parse_header_empty_kid_is_none() {
        let token = token_with_header(r#"{"alg":"RS256","kid":""}"#);

        let header = parse_header(&token).unwrap();
        assert!(header.kid.is_none());
    }

    #[test]
    fn test_parse_header_flags_hmac_algorithms() {
        for alg in ["HS256", "HS384", "HS512"] {
            let token = token_with_header(&format!(r#"{{"alg":"{alg}","kid":"k"}}"#));
            let header = parse_header(&token).unwrap();
            assert!(header.is_symmetric(), "{alg} must be classified symmetric");
        }
    }

    #[test]
    fn test_parse_header_flags_none_algorithm() {
        let token = token_with_header(r#"{"alg":"none"}"#);
        let header = parse_header(&token).unwrap();
        assert!(header.is_unsigned());
        assert!(!header.is_symmetric());
    }

    #[test]
    fn test_parse_header_missing_alg_is_malformed() {
        let token = token_with_header(r#"{"kid":"k"}"#);
        assert_eq!(
            parse_header(&token),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_parse_header_wrong_part_count() {
        assert_eq!(
            parse_header("only.two"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(parse_header(""), Err(JwtValidationError::MalformedToken));
        assert_eq!(
            parse_header("a.b.c.d"),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_parse_header_invalid_base64() {
        assert_eq!(
            parse_header("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_parse_header_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            parse_header(&oversized),
            Err(JwtValidationError::TokenTooLarge)
        );
    }

    // -------------------------------------------------------------------------
    // validate_iat
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_in_past_is_ok() {
        let now = 1_700_000_000;
        assert!(validate_iat_at(now - 3600, DEFAULT_CLOCK_SKEW, now).is_ok());
    }

    #[test]
    fn test_validate_iat_at_skew_boundary_is_ok() {
        let now = 1_700_000_000;
        assert!(validate_iat_at(now + 60, DEFAULT_CLOCK_SKEW, now).is_ok());
    }

    #[test]
    fn test_validate_iat_past_skew_boundary_is_rejected() {
        let now = 1_700_000_000;
        assert_eq!(
            validate_iat_at(now + 61, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        );
    }

    #[test]
    fn test_validate_iat_uses_wall_clock() {
        let now = chrono::Utc::now().timestamp();
        assert!(validate_iat(now, DEFAULT_CLOCK_SKEW).is_ok());
        assert!(validate_iat(now + 3600, DEFAULT_CLOCK_SKEW).is_err());
    }
}
