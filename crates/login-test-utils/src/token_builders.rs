//! Builder for ID token claims.

use chrono::{Duration, Utc};
use serde_json::json;

/// Builder for ID token claims.
///
/// # Example
/// ```rust,ignore
/// let claims = IdTokenBuilder::new(&provider.issuer(), "abc")
///     .for_user("auth0|alice")
///     .with_nonce(&redirect.nonce)
///     .build();
/// let id_token = provider.keypair().sign(&claims);
/// ```
pub struct IdTokenBuilder {
    sub: String,
    iss: String,
    aud: serde_json::Value,
    exp: i64,
    iat: i64,
    nonce: Option<String>,
    name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
}

impl IdTokenBuilder {
    /// Valid claims for `audience` from `issuer`, expiring in an hour.
    pub fn new(issuer: &str, audience: &str) -> Self {
        let now = Utc::now();
        Self {
            sub: "auth0|test-user".to_string(),
            iss: issuer.to_string(),
            aud: json!(audience),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            nonce: None,
            name: Some("Test User".to_string()),
            email: None,
            picture: Some("https://cdn.example/test-user.png".to_string()),
        }
    }

    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Replace the audience with a list.
    pub fn with_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = json!(audiences);
        self
    }

    pub fn with_nonce(mut self, nonce: &str) -> Self {
        self.nonce = Some(nonce.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for expired).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at relative to now (positive for the future).
    pub fn issued_in(mut self, seconds: i64) -> Self {
        self.iat = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    pub fn build(self) -> serde_json::Value {
        let mut claims = json!({
            "sub": self.sub,
            "iss": self.iss,
            "aud": self.aud,
            "exp": self.exp,
            "iat": self.iat,
        });
        let optional = [
            ("nonce", self.nonce),
            ("name", self.name),
            ("email", self.email),
            ("picture", self.picture),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                claims[key] = json!(value);
            }
        }
        claims
    }
}
