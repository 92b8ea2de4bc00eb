//! Inference statistics endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

/// Inference counters since process start.
#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    /// Records classified.
    pub total_inferences: u64,
    /// Engine batches dispatched.
    pub total_batches: u64,
    /// Average records per batch.
    pub avg_batch_size: f64,
    /// Average engine latency per batch in microseconds.
    pub avg_latency_us: f64,
    /// Process start time.
    #[schema(value_type = String)]
    pub started_at: DateTime<Utc>,
    /// Seconds since process start.
    pub uptime_secs: i64,
}

/// Inference statistics
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Inference counters", body = StatsResponse)
    ),
    tag = "health"
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.model.stats();
    Json(StatsResponse {
        total_inferences: stats.total_inferences,
        total_batches: stats.total_batches,
        avg_batch_size: stats.avg_batch_size(),
        avg_latency_us: stats.avg_latency_us(),
        started_at: state.started_at,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}
