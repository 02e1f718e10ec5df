//! Response models for the login service.

use crate::services::ApiResponse;
use crate::stores::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response.
///
/// Returned by the `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status.
    pub status: String,
}

/// Profile shown on the dashboard.
///
/// Taken from the UserInfo profile when one was fetched at login, otherwise
/// from the ID token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub sub: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl From<&Session> for ProfileResponse {
    fn from(session: &Session) -> Self {
        match &session.profile {
            Some(profile) => Self {
                sub: profile.sub.clone(),
                name: profile.name.clone(),
                nickname: profile.nickname.clone(),
                email: profile.email.clone(),
                picture: profile.picture.clone(),
            },
            None => Self {
                sub: session.claims.sub.clone(),
                name: session.claims.name.clone(),
                nickname: session.claims.nickname.clone(),
                email: session.claims.email.clone(),
                picture: session.claims.picture.clone(),
            },
        }
    }
}

/// Response for `/api/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    /// Subject identifier.
    pub sub: String,

    /// Issuer that authenticated the user.
    pub iss: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// ID token issued-at (Unix epoch seconds).
    pub iat: i64,

    pub session_created_at: DateTime<Utc>,
    pub session_expires_at: DateTime<Utc>,
}

impl From<&Session> for MeResponse {
    fn from(session: &Session) -> Self {
        Self {
            sub: session.claims.sub.clone(),
            iss: session.claims.iss.clone(),
            name: session.claims.name.clone(),
            email: session.claims.email.clone(),
            picture: session.claims.picture.clone(),
            iat: session.claims.iat,
            session_created_at: session.created_at,
            session_expires_at: session.expires_at,
        }
    }
}

/// Response for `/api/call`: the downstream API's status and body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallResponse {
    pub status: u16,
    pub body: String,
}

impl From<ApiResponse> for ApiCallResponse {
    fn from(response: ApiResponse) -> Self {
        Self {
            status: response.status,
            body: response.body,
        }
    }
}
