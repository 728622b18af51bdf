//! # API Error
//!
//! Maps [`orchestrator_core::CoreError`] and request-shape failures onto
//! the HTTP status codes named in spec §6: only admission errors ever
//! reach this layer (spec §7 "Propagation policy" — dispatch, worker,
//! timeout, and conflict errors are absorbed by the Scheduler).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator_core::CoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("no auth context")]
    Unauthorized,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("request {0} not found")]
    NotFound(uuid::Uuid),

    #[error("the admission queue is saturated, try again later")]
    Saturated,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Saturated => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Core(core_error) => match core_error {
                CoreError::UnknownWorkflow(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_WORKFLOW"),
                CoreError::InvalidWorkflow(_) => (StatusCode::BAD_REQUEST, "INVALID_WORKFLOW"),
                CoreError::IdempotencyConflict { .. } => (StatusCode::CONFLICT, "IDEMPOTENCY_CONFLICT"),
                CoreError::RequestNotFound(_) | CoreError::WorkflowNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND")
                }
                CoreError::Saturated(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
                _ => {
                    tracing::error!(error = %core_error, "admission path hit a non-admission CoreError");
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
                }
            },
        };
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn unknown_workflow_maps_to_400() {
        let response = ApiError::Core(CoreError::UnknownWorkflow("bogus".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError::NotFound(uuid::Uuid::nil()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn saturated_maps_to_503() {
        let response = ApiError::Saturated.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
