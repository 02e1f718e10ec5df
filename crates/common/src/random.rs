//! CSPRNG-backed opaque tokens.
//!
//! Used for OAuth `state` and OIDC `nonce` values and for session handles.
//! Output is base64url without padding so it can be placed in query strings
//! and cookie values unescaped.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

/// Default entropy for opaque tokens (256 bits).
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// The system CSPRNG failed to produce bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Secure random generation failed")]
pub struct RandomError;

/// Generate an unguessable base64url token from `num_bytes` of entropy.
///
/// # Errors
///
/// Returns `RandomError` if the system CSPRNG is unavailable.
pub fn generate_token(num_bytes: usize) -> Result<String, RandomError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; num_bytes];
    rng.fill(&mut bytes).map_err(|_| {
        tracing::error!(target: "common.random", "SystemRandom fill failed");
        RandomError
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
