use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::error::{AppError, IndexError};

/// API error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {message}")]
    BadRequest { code: &'static str, message: String },

    #[error("Not found: {message}")]
    NotFound { code: &'static str, message: String },

    /// The index answered, but with an error or garbage.
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// The index could not be reached in time.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_type, message) = match self {
            ApiError::BadRequest { code, message } | ApiError::NotFound { code, message } => {
                (code, message)
            }
            ApiError::BadGateway(message) => ("upstream_error", message),
            ApiError::ServiceUnavailable(message) => ("upstream_unavailable", message),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidInput { code, message } => ApiError::BadRequest { code, message },
            AppError::NotFound { code, message } => ApiError::NotFound { code, message },
            AppError::Index(err) => {
                log::error!("search index failure: {}", err);
                match err {
                    IndexError::Unavailable(_) => {
                        ApiError::ServiceUnavailable("Search service unavailable".to_string())
                    }
                    IndexError::Upstream { .. } | IndexError::Decode(_) => {
                        ApiError::BadGateway("Search service error".to_string())
                    }
                }
            }
        }
    }
}
