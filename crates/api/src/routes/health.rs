//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health — confirms the invoicing service is up.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
