//! Identity provider endpoint resolution.
//!
//! Endpoints either follow issuer-relative defaults or come from the
//! provider's `.well-known/openid-configuration` document.

use crate::config::ProviderConfig;
use crate::errors::AuthError;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

/// Resolved provider endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub jwks_uri: Url,
    pub userinfo_endpoint: Option<Url>,
    pub end_session_endpoint: Url,
}

/// Subset of the OpenID Provider Metadata document.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    authorization_endpoint: Url,
    token_endpoint: Url,
    jwks_uri: Url,
    #[serde(default)]
    userinfo_endpoint: Option<Url>,
    #[serde(default)]
    end_session_endpoint: Option<Url>,
}

impl ProviderEndpoints {
    /// Issuer-relative default endpoints.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the issuer is not a valid base URL.
    pub fn from_issuer(issuer: &str) -> Result<Self, AuthError> {
        let base = issuer_base(issuer)?;
        Ok(Self {
            authorization_endpoint: join(&base, "authorize")?,
            token_endpoint: join(&base, "oauth/token")?,
            jwks_uri: join(&base, ".well-known/jwks.json")?,
            userinfo_endpoint: Some(join(&base, "userinfo")?),
            end_session_endpoint: join(&base, "v2/logout")?,
        })
    }

    /// Fetch endpoints from the provider's discovery document.
    ///
    /// A missing `end_session_endpoint` falls back to the issuer-relative
    /// default.
    ///
    /// # Errors
    ///
    /// - `AuthError::UpstreamUnavailable` if the document cannot be fetched or parsed
    /// - `AuthError::Internal` if the document names a different issuer
    #[instrument(skip(http_client))]
    pub async fn discover(http_client: &reqwest::Client, issuer: &str) -> Result<Self, AuthError> {
        let base = issuer_base(issuer)?;
        let url = join(&base, ".well-known/openid-configuration")?;

        tracing::debug!(target: "login.services.discovery", url = %url, "Fetching provider metadata");

        let response = http_client.get(url).send().await.map_err(|e| {
            tracing::error!(target: "login.services.discovery", error = %e, "Discovery request failed");
            AuthError::UpstreamUnavailable {
                retryable: e.is_timeout() || e.is_connect(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(target: "login.services.discovery", status = %status, "Discovery endpoint returned error");
            return Err(AuthError::UpstreamUnavailable {
                retryable: status.is_server_error(),
            });
        }

        let document: DiscoveryDocument = response.json().await.map_err(|e| {
            tracing::error!(target: "login.services.discovery", error = %e, "Failed to parse discovery document");
            AuthError::UpstreamUnavailable { retryable: false }
        })?;

        if document.issuer != issuer {
            tracing::error!(
                target: "login.services.discovery",
                configured = %issuer,
                discovered = %document.issuer,
                "Discovery document issuer mismatch"
            );
            return Err(AuthError::Internal);
        }

        let end_session_endpoint = match document.end_session_endpoint {
            Some(url) => url,
            None => join(&base, "v2/logout")?,
        };

        tracing::info!(target: "login.services.discovery", "Provider endpoints discovered");

        Ok(Self {
            authorization_endpoint: document.authorization_endpoint,
            token_endpoint: document.token_endpoint,
            jwks_uri: document.jwks_uri,
            userinfo_endpoint: document.userinfo_endpoint,
            end_session_endpoint,
        })
    }

    /// Resolve endpoints for a provider registration.
    ///
    /// # Errors
    ///
    /// See [`discover`](Self::discover) and [`from_issuer`](Self::from_issuer).
    pub async fn resolve(
        provider: &ProviderConfig,
        http_client: &reqwest::Client,
    ) -> Result<Self, AuthError> {
        if provider.use_discovery {
            Self::discover(http_client, &provider.issuer).await
        } else {
            Self::from_issuer(&provider.issuer)
        }
    }
}

/// The issuer as a directory URL, so relative joins append to its path.
fn issuer_base(issuer: &str) -> Result<Url, AuthError> {
    let with_slash = if issuer.ends_with('/') {
        issuer.to_string()
    } else {
        format!("{issuer}/")
    };
    Url::parse(&with_slash).map_err(|e| {
        tracing::error!(target: "login.services.discovery", error = %e, "Invalid issuer URL");
        AuthError::Internal
    })
}

fn join(base: &Url, path: &str) -> Result<Url, AuthError> {
    base.join(path).map_err(|e| {
        tracing::error!(target: "login.services.discovery", error = %e, path = %path, "Invalid endpoint path");
        AuthError::Internal
    })
}
