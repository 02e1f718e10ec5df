//! Identity token verification.
//!
//! Verifies OIDC ID tokens against the provider's JWKS.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Symmetric (`HS*`) and `none` algorithms are rejected outright
//! - The JWK's key type and algorithm must agree with the token header
//! - `iss`, `aud` and `exp` are checked exactly; `iat` gets clock skew tolerance
//! - Generic error messages prevent information leakage

use crate::auth::claims::IdentityClaims;
use crate::auth::jwks::{Jwk, JwksClient};
use crate::errors::AuthError;
use common::jwt::{parse_header, validate_iat_at};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// ID token verifier backed by a JWKS cache.
pub struct IdTokenVerifier {
    /// JWKS client for fetching public keys.
    jwks_client: Arc<JwksClient>,

    /// Clock skew tolerance for iat validation.
    clock_skew: Duration,
}

impl IdTokenVerifier {
    pub fn new(jwks_client: Arc<JwksClient>, clock_skew: Duration) -> Self {
        Self {
            jwks_client,
            clock_skew,
        }
    }

    /// Verify an ID token and return its claims.
    ///
    /// # Security Checks
    ///
    /// 1. Size check and header parse
    /// 2. Reject symmetric and unsigned algorithms
    /// 3. Resolve the signing key by `kid` (at most one JWKS refresh)
    /// 4. Verify the signature with a key matching the header algorithm
    /// 5. `iss` exact match, `aud` contains the expected value
    /// 6. `exp` in the future, `iat` within clock skew
    ///
    /// # Errors
    ///
    /// - `SignatureInvalid` for malformed tokens, rejected algorithms, key
    ///   mismatches and bad signatures
    /// - `KeyNotFound` if no key matches the token's `kid`
    /// - `ClaimInvalid { claim }` for `iss`, `aud`, `exp` or `sub` failures
    /// - `ClockSkew` if `iat` is too far in the future
    /// - `UpstreamUnavailable` if the JWKS cannot be fetched
    #[instrument(skip_all)]
    pub async fn verify(
        &self,
        token: &str,
        expected_audience: &str,
        expected_issuer: &str,
    ) -> Result<IdentityClaims, AuthError> {
        let now = chrono::Utc::now().timestamp();
        self.verify_at(token, expected_audience, expected_issuer, now)
            .await
    }

    /// Deterministic variant of [`verify`](Self::verify) against an explicit
    /// `now` timestamp.
    pub async fn verify_at(
        &self,
        token: &str,
        expected_audience: &str,
        expected_issuer: &str,
        now: i64,
    ) -> Result<IdentityClaims, AuthError> {
        // 1. Header (includes size check via common::jwt)
        let header = parse_header(token).map_err(|e| {
            tracing::debug!(target: "login.auth.jwt", error = ?e, "Token header parse failed");
            AuthError::SignatureInvalid
        })?;

        // 2. Algorithm policy
        if header.is_symmetric() || header.is_unsigned() {
            tracing::warn!(target: "login.auth.jwt", alg = %header.alg, "Rejected token with forbidden algorithm");
            return Err(AuthError::SignatureInvalid);
        }
        let algorithm = Algorithm::from_str(&header.alg).map_err(|_| {
            tracing::warn!(target: "login.auth.jwt", alg = %header.alg, "Unsupported token algorithm");
            AuthError::SignatureInvalid
        })?;

        // 3. Key lookup
        let kid = header.kid.ok_or_else(|| {
            tracing::debug!(target: "login.auth.jwt", "Token header has no kid");
            AuthError::KeyNotFound
        })?;
        let jwk = self.jwks_client.get_key(&kid).await?;

        // 4. Signature
        let claims = verify_signature(token, &jwk, algorithm)?;

        // 5-6. Standard claims
        validate_claims_at(
            &claims,
            expected_audience,
            expected_issuer,
            self.clock_skew,
            now,
        )?;

        tracing::debug!(target: "login.auth.jwt", kid = %kid, "ID token verified");
        Ok(claims)
    }
}

/// Verify the token signature and decode the claims without checking them.
fn verify_signature(
    token: &str,
    jwk: &Jwk,
    algorithm: Algorithm,
) -> Result<IdentityClaims, AuthError> {
    let decoding_key = decoding_key_for(jwk, algorithm)?;

    // Claims are checked by validate_claims_at so errors map to precise variants.
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let token_data = decode::<IdentityClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "login.auth.jwt", error = %e, "Token verification failed");
        match e.kind() {
            ErrorKind::Json(_) => AuthError::ClaimInvalid { claim: "payload" },
            _ => AuthError::SignatureInvalid,
        }
    })?;

    Ok(token_data.claims)
}

/// Build a verification key from a JWK, requiring it to fit `algorithm`.
fn decoding_key_for(jwk: &Jwk, algorithm: Algorithm) -> Result<DecodingKey, AuthError> {
    if let Some(alg) = &jwk.alg {
        if Algorithm::from_str(alg).ok() != Some(algorithm) {
            tracing::warn!(target: "login.auth.jwt", jwk_alg = %alg, token_alg = ?algorithm, "JWK algorithm does not match token");
            return Err(AuthError::SignatureInvalid);
        }
    }

    let key = match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => {
            require_kty(jwk, "RSA")?;
            let n = require_member(jwk, jwk.n.as_deref(), "n")?;
            let e = require_member(jwk, jwk.e.as_deref(), "e")?;
            DecodingKey::from_rsa_components(n, e)
        }
        Algorithm::ES256 | Algorithm::ES384 => {
            require_kty(jwk, "EC")?;
            let expected_crv = if algorithm == Algorithm::ES256 {
                "P-256"
            } else {
                "P-384"
            };
            require_crv(jwk, expected_crv)?;
            let x = require_member(jwk, jwk.x.as_deref(), "x")?;
            let y = require_member(jwk, jwk.y.as_deref(), "y")?;
            DecodingKey::from_ec_components(x, y)
        }
        Algorithm::EdDSA => {
            require_kty(jwk, "OKP")?;
            require_crv(jwk, "Ed25519")?;
            let x = require_member(jwk, jwk.x.as_deref(), "x")?;
            DecodingKey::from_ed_components(x)
        }
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            return Err(AuthError::SignatureInvalid);
        }
    };

    key.map_err(|e| {
        tracing::error!(target: "login.auth.jwt", kid = ?jwk.kid, error = %e, "Invalid public key encoding");
        AuthError::SignatureInvalid
    })
}

fn require_kty(jwk: &Jwk, expected: &str) -> Result<(), AuthError> {
    if jwk.kty != expected {
        tracing::warn!(target: "login.auth.jwt", kty = %jwk.kty, expected = %expected, "Unexpected JWK key type");
        return Err(AuthError::SignatureInvalid);
    }
    Ok(())
}

fn require_crv(jwk: &Jwk, expected: &str) -> Result<(), AuthError> {
    if jwk.crv.as_deref() != Some(expected) {
        tracing::warn!(target: "login.auth.jwt", crv = ?jwk.crv, expected = %expected, "Unexpected JWK curve");
        return Err(AuthError::SignatureInvalid);
    }
    Ok(())
}

fn require_member<'a>(
    jwk: &Jwk,
    value: Option<&'a str>,
    member: &str,
) -> Result<&'a str, AuthError> {
    value.ok_or_else(|| {
        tracing::error!(target: "login.auth.jwt", kid = ?jwk.kid, member = %member, "JWK missing key material");
        AuthError::SignatureInvalid
    })
}

/// Check the standard claims of a signature-verified token.
///
/// Order: `iss`, `aud`, `exp`, `iat`, `sub`.
pub fn validate_claims_at(
    claims: &IdentityClaims,
    expected_audience: &str,
    expected_issuer: &str,
    clock_skew: Duration,
    now: i64,
) -> Result<(), AuthError> {
    if claims.iss != expected_issuer {
        tracing::debug!(target: "login.auth.jwt", iss = %claims.iss, expected = %expected_issuer, "Issuer mismatch");
        return Err(AuthError::ClaimInvalid { claim: "iss" });
    }

    if !claims.aud.contains(expected_audience) {
        tracing::debug!(target: "login.auth.jwt", aud = ?claims.aud, "Audience does not include client");
        return Err(AuthError::ClaimInvalid { claim: "aud" });
    }

    if claims.exp <= now {
        tracing::debug!(target: "login.auth.jwt", exp = claims.exp, now = now, "Token expired");
        return Err(AuthError::ClaimInvalid { claim: "exp" });
    }

    if let Err(e) = validate_iat_at(claims.iat, clock_skew, now) {
        tracing::debug!(target: "login.auth.jwt", error = ?e, "Token iat validation failed");
        return Err(AuthError::ClockSkew);
    }

    if claims.sub.is_empty() {
        return Err(AuthError::ClaimInvalid { claim: "sub" });
    }

    Ok(())
}
