//! Client for the downstream API protected by the provider's access tokens.
//!
//! The relying party forwards the access token obtained at login as a
//! bearer credential. The upstream status and body are passed back to the
//! caller unchanged; only transport failures become errors.

use crate::errors::AuthError;
use crate::observability::metrics;
use common::secret::{ExposeSecret, SecretString};
use std::time::Instant;
use tracing::instrument;
use url::Url;

/// Largest upstream body relayed to the caller.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Response from the downstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Calls `GET {api_url}` with `Authorization: Bearer <access_token>`.
pub struct ProtectedApiClient {
    http_client: reqwest::Client,
    endpoint: Url,
}

impl ProtectedApiClient {
    pub fn new(http_client: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Call the API on behalf of the holder of `access_token`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamUnavailable` if the API cannot be reached
    /// or its body cannot be read. Non-2xx statuses are returned as an
    /// `ApiResponse`.
    #[instrument(skip_all, fields(url = %self.endpoint))]
    pub async fn call(&self, access_token: &SecretString) -> Result<ApiResponse, AuthError> {
        let start = Instant::now();

        let response = self
            .http_client
            .get(self.endpoint.clone())
            .header("Accept", "application/json")
            .bearer_auth(access_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "login.services.api", error = %e, "API request failed");
                metrics::record_api_call("error", start.elapsed());
                AuthError::UpstreamUnavailable {
                    retryable: e.is_timeout() || e.is_connect(),
                }
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            tracing::warn!(target: "login.services.api", error = %e, "Failed to read API response");
            metrics::record_api_call("error", start.elapsed());
            AuthError::UpstreamUnavailable {
                retryable: e.is_timeout(),
            }
        })?;

        let body = truncated_utf8(&bytes, MAX_RESPONSE_BYTES);

        if status.is_success() {
            tracing::debug!(target: "login.services.api", status = %status, "API call succeeded");
            metrics::record_api_call("success", start.elapsed());
        } else {
            tracing::info!(target: "login.services.api", status = %status, "API returned error status");
            metrics::record_api_call("rejected", start.elapsed());
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Lossy UTF-8 of at most `limit` bytes of `bytes`.
fn truncated_utf8(bytes: &[u8], limit: usize) -> String {
    let end = bytes.len().min(limit);
    String::from_utf8_lossy(bytes.get(..end).unwrap_or_default()).into_owned()
}
