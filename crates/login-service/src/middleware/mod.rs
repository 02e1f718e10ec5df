//! Middleware for the login service.
//!
//! # Components
//!
//! - `auth` - Session guards for browser and API routes
//! - `http_metrics` - Per-request metrics

pub mod auth;
pub mod http_metrics;

pub use auth::{require_session_api, require_session_browser, SessionExt, SESSION_COOKIE_NAME};
pub use http_metrics::http_metrics_middleware;
