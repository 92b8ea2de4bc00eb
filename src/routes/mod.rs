//! API routes

pub mod health;
pub mod predict;
pub mod stats;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{PredictError, ValidationError};

/// Error payload returned for every failed request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

/// Handler-level error, mapped onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// A 400 rejection raised before the request reaches the scheduler.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_request",
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: err.to_string(),
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        let (status, code) = match &err {
            PredictError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            PredictError::Preprocess(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "preprocessing_error")
            }
            PredictError::Inference(_) => (StatusCode::INTERNAL_SERVER_ERROR, "inference_error"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                code: self.code.into(),
                message: self.message,
            }),
        )
            .into_response()
    }
}
