//! Metrics definitions for the login service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `login_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: the fixed route set, everything else is `/other`
//! - `status`: success, error, timeout
//! - `outcome`: `success` or an `AuthError::error_type()` label
//!
//! No label ever carries a subject, state, nonce, code or session handle.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("login_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Callback latency includes the token exchange and JWKS round trips
        .set_buckets_for_metric(
            Matcher::Prefix("login_callback".to_string()),
            &[
                0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set callback buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("login_token_exchange".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set token exchange buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("login_jwks_refresh".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `login_http_requests_total`, `login_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("login_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("login_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto the fixed route set.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/login" => "/login",
        "/callback" => "/callback",
        "/logout" => "/logout",
        "/dashboard" => "/dashboard",
        "/api/me" => "/api/me",
        "/api/call" => "/api/call",
        "/health" => "/health",
        "/metrics" => "/metrics",
        _ => "/other",
    }
}

// ============================================================================
// Login Flow Metrics
// ============================================================================

/// Record a login attempt being started.
///
/// Metric: `login_started_total`
pub fn record_login_started() {
    counter!("login_started_total").increment(1);
}

/// Record a completed callback.
///
/// Metric: `login_callbacks_total`, `login_callback_duration_seconds`
/// Labels: `outcome`
pub fn record_callback(outcome: &'static str, duration: Duration) {
    histogram!("login_callback_duration_seconds",
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());

    counter!("login_callbacks_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a logout.
///
/// Metric: `login_logouts_total`
/// Labels: `had_session`
pub fn record_logout(had_session: bool) {
    counter!("login_logouts_total",
        "had_session" => had_session.to_string()
    )
    .increment(1);
}

// ============================================================================
// Provider Metrics
// ============================================================================

/// Record a token exchange, including the number of attempts it took.
///
/// Metric: `login_token_exchange_total`, `login_token_exchange_duration_seconds`,
/// `login_token_exchange_attempts`
/// Labels: `status`
pub fn record_token_exchange(status: &'static str, attempts: u32, duration: Duration) {
    histogram!("login_token_exchange_duration_seconds",
        "status" => status
    )
    .record(duration.as_secs_f64());

    histogram!("login_token_exchange_attempts").record(f64::from(attempts));

    counter!("login_token_exchange_total",
        "status" => status
    )
    .increment(1);
}

/// Record a JWKS fetch.
///
/// Metric: `login_jwks_refresh_total`, `login_jwks_refresh_duration_seconds`
/// Labels: `status`
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("login_jwks_refresh_duration_seconds").record(duration.as_secs_f64());

    counter!("login_jwks_refresh_total",
        "status" => status
    )
    .increment(1);
}

/// Record a call to the protected downstream API.
///
/// Metric: `login_api_calls_total`, `login_api_call_duration_seconds`
/// Labels: `status` (`success`, `rejected`, `error`)
pub fn record_api_call(status: &'static str, duration: Duration) {
    histogram!("login_api_call_duration_seconds").record(duration.as_secs_f64());

    counter!("login_api_calls_total",
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Store Gauges
// ============================================================================

/// Metric: `login_active_sessions`
pub fn set_active_sessions(count: usize) {
    gauge!("login_active_sessions").set(count as f64);
}

/// Metric: `login_pending_logins`
pub fn set_pending_logins(count: usize) {
    gauge!("login_pending_logins").set(count as f64);
}
