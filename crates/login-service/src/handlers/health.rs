//! Health check handler.

use crate::models::HealthResponse;
use axum::Json;

/// Liveness check. Does not check the identity provider.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
