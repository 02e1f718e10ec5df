//! Service layer for the login service.
//!
//! These services talk to the identity provider and drive the login flow.
//!
//! # Components
//!
//! - `api_client` - Bearer calls to the protected downstream API
//! - `auth_flow` - Authorization Code flow orchestration
//! - `endpoints` - Provider endpoint resolution (static or discovery)
//! - `token_client` - Code-for-token exchange with bounded retry
//! - `userinfo` - UserInfo profile fetch

pub mod api_client;
pub mod auth_flow;
pub mod endpoints;
pub mod token_client;
pub mod userinfo;

pub use api_client::{ApiResponse, ProtectedApiClient};
pub use auth_flow::{AuthFlow, CallbackQuery, CompletedLogin};
pub use endpoints::ProviderEndpoints;
pub use token_client::{TokenExchangeClient, TokenSet};
pub use userinfo::{UserInfoClient, UserProfile};

use crate::errors::AuthError;
use std::time::Duration;
use tracing::error;

/// Connect timeout for provider requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the HTTP client shared by all provider calls.
///
/// `timeout` bounds each individual request.
///
/// # Errors
///
/// Returns `AuthError::Internal` if the client cannot be built.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
        .map_err(|e| {
            error!(target: "login.services", error = %e, "Failed to build HTTP client");
            AuthError::Internal
        })
}
