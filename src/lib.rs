//! Network Intrusion Detection Engine (NIDE)
//!
//! ML-powered classification of network connections over the NSL-KDD
//! feature schema, served over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        HTTP GATEWAY (axum)                       │
//! │     /predict  |  /predict/batch  |  /health  |  /stats           │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ validated ConnectionRecords
//! ┌───────────────────────────────▼──────────────────────────────────┐
//! │                     BATCHING SCHEDULER                           │
//! │   single coordinator · size/deadline batch close · FIFO          │
//! │   bounded worker pool · positional result fan-out                │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ closed batches
//! ┌───────────────────────────────▼──────────────────────────────────┐
//! │                      INFERENCE ENGINE                            │
//! │   preprocessing (encode · reorder · scale) → forest soft-vote    │
//! │   artifacts loaded read-only at process start                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod descriptions;
pub mod features;
pub mod model;
pub mod preprocess;
pub mod routes;
pub mod scheduler;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use config::Config;
pub use features::ConnectionRecord;
pub use model::{Classifier, ForestModel, Prediction};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle};

/// A record rejected at the API boundary, before entering the pipeline.
#[derive(Debug, Error)]
#[error("invalid value for `{field}`: {reason}")]
pub struct ValidationError {
    /// Offending field name.
    pub field: &'static str,
    /// Why the value was rejected.
    pub reason: String,
}

impl ValidationError {
    /// Build a validation error for one field.
    pub fn new(field: &'static str, reason: String) -> Self {
        Self { field, reason }
    }
}

/// Errors surfaced while classifying a submitted record.
///
/// Clonable: a batch-level failure is broadcast identically to every
/// member of the failed batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictError {
    /// The preprocessing adapter could not build the feature matrix.
    #[error("preprocessing failed: {0}")]
    Preprocess(String),
    /// The inference engine failed on the whole batch.
    #[error("inference failed: {0}")]
    Inference(String),
    /// The scheduler is shutting down and no longer accepts submissions.
    #[error("scheduler unavailable")]
    Unavailable,
}

/// Errors loading the model artifact bundle at startup.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The bundle file could not be read.
    #[error("failed to read artifact bundle: {0}")]
    Io(#[from] std::io::Error),
    /// The bundle is not valid JSON or misses required fields.
    #[error("failed to parse artifact bundle: {0}")]
    Parse(#[from] serde_json::Error),
    /// The bundle parsed but its shapes are inconsistent.
    #[error("malformed artifact bundle: {0}")]
    Shape(String),
}

/// Shared application state handed to every handler.
pub struct AppState {
    /// Handle to the running batching scheduler.
    pub scheduler: SchedulerHandle,
    /// The loaded model, for health/stats introspection.
    pub model: Arc<ForestModel>,
    /// Process start time.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Spawn a scheduler over the model and assemble the shared state.
    pub fn new(model: Arc<ForestModel>, scheduler_config: SchedulerConfig) -> Self {
        let scheduler = Scheduler::spawn(scheduler_config, model.clone());
        Self {
            scheduler,
            model,
            started_at: Utc::now(),
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Network Intrusion Detection API",
        description = "Classification of network connections with a model trained on NSL-KDD"
    ),
    paths(
        routes::health::root,
        routes::health::health_check,
        routes::stats::get_stats,
        routes::predict::predict,
        routes::predict::predict_batch,
    ),
    components(
        schemas(
            ConnectionRecord,
            routes::ErrorResponse,
            routes::health::RootResponse,
            routes::health::HealthResponse,
            routes::stats::StatsResponse,
            routes::predict::PredictionResponse,
            routes::predict::BatchItem,
            routes::predict::BatchPredictionResponse,
        )
    ),
    tags(
        (name = "health", description = "Health and introspection endpoints"),
        (name = "prediction", description = "Connection classification")
    )
)]
pub struct ApiDoc;

/// Build the API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/stats", get(routes::stats::get_stats))
        .route("/predict", post(routes::predict::predict))
        .route("/predict/batch", post(routes::predict::predict_batch))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
