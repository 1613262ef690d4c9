//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each
//! variant is rendered as an HTTP response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tab_tracker_core::ports::PortError;
use tab_tracker_core::validation::ValidationError;
use tracing::error;
use utoipa::ToSchema;

use crate::config::ConfigError;

/// JSON body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the storage port.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request body is not valid JSON.
    #[error("Invalid JSON")]
    InvalidJson,

    /// A required field is absent from the request.
    #[error("Missing field: '{0}'")]
    MissingField(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Port(PortError::Validation(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson | ApiError::MissingField(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Port(port) => match port {
                PortError::Validation(_) | PortError::Conflict(_) => StatusCode::BAD_REQUEST,
                PortError::NotFound(_) => StatusCode::NOT_FOUND,
                PortError::Unauthorized => StatusCode::UNAUTHORIZED,
                PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Port(PortError::Validation(e)) => e.to_string(),
            ApiError::Port(PortError::Conflict(msg)) | ApiError::Port(PortError::NotFound(msg)) => {
                msg.clone()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        }
        let body = ErrorBody {
            error: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_400() {
        assert_eq!(ApiError::InvalidJson.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::MissingField("url").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(ValidationError::EndBeforeStart).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Port(PortError::Conflict("taken".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn port_errors_keep_their_meaning() {
        assert_eq!(
            ApiError::Port(PortError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Port(PortError::Unauthorized).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Port(PortError::Unexpected("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_are_client_facing() {
        assert_eq!(ApiError::MissingField("startTime").message(), "Missing field: 'startTime'");
        assert_eq!(
            ApiError::from(ValidationError::EndBeforeStart).message(),
            "End time must be later than start time"
        );
    }
}
