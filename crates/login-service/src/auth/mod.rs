//! Identity token verification.
//!
//! # Components
//!
//! - `jwks` - JWKS client for fetching and caching the provider's signing keys
//! - `jwt` - ID token verification using cached JWKS keys
//! - `claims` - Claims structure for verified ID tokens

pub mod claims;
pub mod jwks;
pub mod jwt;

pub use claims::{Audience, IdentityClaims};
pub use jwks::JwksClient;
pub use jwt::IdTokenVerifier;
