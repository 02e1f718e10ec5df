//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types
//! for every value that must never reach a log line or a browser: the OAuth
//! client secret, access/ID/refresh tokens, and the session signing secret.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` and holds one gets safe logging behavior for free.
//! Secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct ClientCredentials {
//!     client_id: String,
//!     client_secret: SecretString,
//! }
//!
//! let creds = ClientCredentials {
//!     client_id: "abc".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//!
//! // Debug output is redacted
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//!
//! // Access requires an explicit call
//! let secret: &str = creds.client_secret.expose_secret();
//! assert_eq!(secret, "s3cr3t");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("client-secret-123");
        assert_eq!(secret.expose_secret(), "client-secret-123");
    }

    #[test]
    fn test_token_response_deserializes_into_secret() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct TokenBody {
            token_type: String,
            access_token: SecretString,
        }

        let json = r#"{"token_type": "Bearer", "access_token": "opaque-access-token"}"#;
        let body: TokenBody = serde_json::from_str(json).expect("deserialize");

        assert_eq!(body.access_token.expose_secret(), "opaque-access-token");

        let debug = format!("{body:?}");
        assert!(debug.contains("Bearer"));
        assert!(!debug.contains("opaque-access-token"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
