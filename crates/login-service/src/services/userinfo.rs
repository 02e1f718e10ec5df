//! UserInfo endpoint client.
//!
//! Fetches the end-user profile with the access token obtained at login.

use crate::errors::AuthError;
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;
use url::Url;

/// Profile returned by the provider's UserInfo endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subject - must match the ID token's `sub`.
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl fmt::Debug for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserProfile")
            .field("sub", &"[REDACTED]")
            .field("name", &self.name)
            .field("nickname", &self.nickname)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("email_verified", &self.email_verified)
            .field("picture", &self.picture)
            .finish()
    }
}

/// Client for `GET {userinfo_endpoint}`.
pub struct UserInfoClient {
    http_client: reqwest::Client,
    endpoint: Url,
}

impl UserInfoClient {
    pub fn new(http_client: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }

    /// Fetch the profile for the holder of `access_token`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamUnavailable` if the endpoint is unreachable,
    /// rejects the token, or returns an unparseable body.
    #[instrument(skip_all)]
    pub async fn fetch(&self, access_token: &SecretString) -> Result<UserProfile, AuthError> {
        let response = self
            .http_client
            .get(self.endpoint.clone())
            .bearer_auth(access_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "login.services.userinfo", error = %e, "UserInfo request failed");
                AuthError::UpstreamUnavailable {
                    retryable: e.is_timeout() || e.is_connect(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(target: "login.services.userinfo", status = %status, "UserInfo endpoint returned error");
            return Err(AuthError::UpstreamUnavailable {
                retryable: status.is_server_error(),
            });
        }

        response.json().await.map_err(|e| {
            tracing::warn!(target: "login.services.userinfo", error = %e, "Failed to parse UserInfo response");
            AuthError::UpstreamUnavailable { retryable: false }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> UserInfoClient {
        UserInfoClient::new(
            reqwest::Client::new(),
            Url::parse(&format!("{base_url}/userinfo")).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "auth0|123",
                "name": "Ada Lovelace",
                "picture": "https://cdn.example/ada.png",
                "updated_at": "2024-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let profile = client(&mock_server.uri())
            .fetch(&SecretString::from("at-123"))
            .await
            .unwrap();

        assert_eq!(profile.sub, "auth0|123");
        assert_eq!(profile.name.as_deref(), Some("Ada Lovelace"));
        assert!(profile.email.is_none());
    }

    #[tokio::test]
    async fn test_rejected_token_is_not_retryable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server.uri())
            .fetch(&SecretString::from("expired"))
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::UpstreamUnavailable { retryable: false });
    }

    #[test]
    fn test_debug_redacts_identifiers() {
        let profile = UserProfile {
            sub: "auth0|hidden".to_string(),
            name: Some("Ada".to_string()),
            nickname: None,
            email: Some("ada@example.com".to_string()),
            email_verified: Some(true),
            picture: None,
        };

        let debug_str = format!("{profile:?}");
        assert!(!debug_str.contains("auth0|hidden"));
        assert!(!debug_str.contains("ada@example.com"));
        assert!(debug_str.contains("Ada"));
    }
}
