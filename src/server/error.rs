//! Error responses for the HTTP transport.

use crate::task::services::{FailureKind, TaskBrokerError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Serialize)]
struct ErrorBody {
    errors: Vec<String>,
}

/// Failure rendered as `{"errors":[...]}` with a matching status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Creates an error with an explicit status.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Malformed request body or parameters.
    #[must_use]
    pub fn bad_request(message: impl Display) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.to_string())
    }

    /// Missing or wrong auth token.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid or missing auth token")
    }

    /// Mutation attempted while the broker is starting or draining.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "broker is in safe mode, mutations are rejected",
        )
    }

    /// Failure inside the broker itself.
    #[must_use]
    pub fn internal(message: impl Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
    }
}

impl From<TaskBrokerError> for ApiError {
    fn from(err: TaskBrokerError) -> Self {
        let status = match err.kind() {
            FailureKind::Validation => StatusCode::BAD_REQUEST,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::Precondition => StatusCode::CONFLICT,
            FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            errors: vec![self.message],
        };
        (self.status, Json(body)).into_response()
    }
}
