//! # Login Test Utilities
//!
//! Shared test utilities for the login service.
//!
//! This crate provides:
//! - Deterministic signing keys (`TestKeypair`) and JWK documents
//! - An ID token claims builder (`IdTokenBuilder`)
//! - A wiremock-backed identity provider (`MockProvider`)
//! - A server harness (`TestLoginServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use login_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let provider = MockProvider::start().await;
//!     provider.mount_jwks().await;
//!     let server = TestLoginServer::spawn(&provider).await?;
//!
//!     let redirect = server.begin_login(None).await?;
//!     assert!(redirect.location.as_str().starts_with(&provider.uri()));
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_provider;
pub mod server_harness;
pub mod token_builders;

pub use crypto_fixtures::*;
pub use mock_provider::*;
pub use server_harness::*;
pub use token_builders::*;
