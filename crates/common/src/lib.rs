//! Common utilities and types shared across Gatehouse components.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (header parsing, size limits, clock skew)
pub mod jwt;

/// Module for CSPRNG-backed opaque tokens (state, nonce, session handles)
pub mod random;
