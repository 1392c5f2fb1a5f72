// ABOUTME: HTTP error type for the backend API
// ABOUTME: Maps the job error taxonomy onto status codes with a JSON body

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::JobError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Job {0} not found")]
    NotFound(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Job(err) => match err {
                JobError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                JobError::Configuration(_) => {
                    tracing::error!(error = %err, "Backend is not configured for the provider");
                    (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
                }
                JobError::Connectivity(_) | JobError::Api { .. } => {
                    (StatusCode::BAD_GATEWAY, "PROVIDER_UNAVAILABLE")
                }
                JobError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                JobError::ProviderFailure { .. } | JobError::MalformedOutput { .. } => {
                    (StatusCode::BAD_GATEWAY, "PROVIDER_FAILURE")
                }
                JobError::TimeoutExceeded { .. } => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            },
        };

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}
