use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use job_tracker_core::{RequestError, StoreError};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Failure outcome of a job endpoint, rendered as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn missing_id() -> Self {
        Self::Validation("Job ID is required".to_string())
    }

    pub fn job_not_found() -> Self {
        Self::NotFound("Job not found".to_string())
    }

    pub fn route_not_found() -> Self {
        Self::NotFound("Not found".to_string())
    }

    pub fn method_not_allowed() -> Self {
        Self::MethodNotAllowed("Method not allowed".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the `result` dimension of request metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid",
            Self::NotFound(_) => "not_found",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
