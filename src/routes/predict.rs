//! Prediction endpoints
//!
//! Both endpoints validate records at the boundary and submit them to the
//! batching scheduler; the scheduler decides how requests coalesce into
//! engine batches regardless of how they arrived over HTTP.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use super::{ApiError, ErrorResponse};
use crate::descriptions::{describe, ClassDescription};
use crate::features::ConnectionRecord;
use crate::{AppState, PredictError};

/// Upper bound on records per `/predict/batch` request.
pub const MAX_BATCH_REQUEST: usize = 1000;

/// Single-connection classification result.
#[derive(Debug, Serialize, ToSchema)]
pub struct PredictionResponse {
    /// Predicted class label.
    pub prediction: String,
    /// Per-class probabilities.
    pub probabilities: BTreeMap<String, f64>,
    /// Textual metadata for the predicted class.
    #[schema(value_type = Object)]
    pub description: &'static ClassDescription,
    /// End-to-end request latency in milliseconds.
    pub latency_ms: f64,
}

/// One item of a batch response.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItem {
    /// Predicted class label.
    pub prediction: String,
    /// Per-class probabilities.
    pub probabilities: BTreeMap<String, f64>,
}

/// Batch classification result.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchPredictionResponse {
    /// Number of classified records.
    pub total: usize,
    /// Per-record results, in request order.
    pub predictions: Vec<BatchItem>,
    /// End-to-end request latency in milliseconds.
    pub latency_ms: f64,
}

/// Classify a single connection
#[utoipa::path(
    post,
    path = "/predict",
    request_body = ConnectionRecord,
    responses(
        (status = 200, description = "Classification result", body = PredictionResponse),
        (status = 400, description = "Invalid record", body = ErrorResponse),
        (status = 500, description = "Inference failure", body = ErrorResponse),
        (status = 503, description = "Scheduler shutting down", body = ErrorResponse),
    ),
    tag = "prediction"
)]
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(record): Json<ConnectionRecord>,
) -> Result<Json<PredictionResponse>, ApiError> {
    record.validate()?;

    let started = Instant::now();
    let prediction = state.scheduler.submit(record).await?;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    Ok(Json(PredictionResponse {
        description: describe(&prediction.label),
        prediction: prediction.label,
        probabilities: prediction.probabilities,
        latency_ms,
    }))
}

/// Classify a batch of connections
#[utoipa::path(
    post,
    path = "/predict/batch",
    request_body = Vec<ConnectionRecord>,
    responses(
        (status = 200, description = "Batch classification result", body = BatchPredictionResponse),
        (status = 400, description = "Empty, oversized or invalid batch", body = ErrorResponse),
        (status = 500, description = "Inference failure", body = ErrorResponse),
        (status = 503, description = "Scheduler shutting down", body = ErrorResponse),
    ),
    tag = "prediction"
)]
pub async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<ConnectionRecord>>,
) -> Result<Json<BatchPredictionResponse>, ApiError> {
    if records.is_empty() {
        return Err(ApiError::bad_request("batch must contain at least one record"));
    }
    if records.len() > MAX_BATCH_REQUEST {
        return Err(ApiError::bad_request(format!(
            "batch is limited to {MAX_BATCH_REQUEST} records"
        )));
    }
    for (index, record) in records.iter().enumerate() {
        record
            .validate()
            .map_err(|e| ApiError::bad_request(format!("record {index}: {e}")))?;
    }

    let started = Instant::now();

    // Submit every record individually; the scheduler re-cuts the stream
    // into engine batches of its own size.
    let tasks: Vec<_> = records
        .into_iter()
        .map(|record| {
            let scheduler = state.scheduler.clone();
            tokio::spawn(async move { scheduler.submit(record).await })
        })
        .collect();

    let mut predictions = Vec::with_capacity(tasks.len());
    for task in tasks {
        let prediction = task
            .await
            .map_err(|e| ApiError::from(PredictError::Inference(e.to_string())))??;
        predictions.push(BatchItem {
            prediction: prediction.label,
            probabilities: prediction.probabilities,
        });
    }
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    Ok(Json(BatchPredictionResponse {
        total: predictions.len(),
        predictions,
        latency_ms,
    }))
}
