//! Health check endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

/// Root service banner.
#[derive(Serialize, ToSchema)]
pub struct RootResponse {
    /// Always "ok" while the process serves traffic.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Crate version.
    pub version: String,
}

/// Health payload.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves traffic.
    pub status: String,
    /// Loaded model name.
    pub model: String,
    /// Class labels the model can emit.
    pub classes: Vec<String>,
}

/// Service banner
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service banner", body = RootResponse)
    ),
    tag = "health"
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok".into(),
        service: "Network Intrusion Detection API".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        model: state.model.name().into(),
        classes: state.model.classes().to_vec(),
    })
}
