//! Error types for the HTTP control API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - a run is already active
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// recon-common error
    #[error("Common error: {0}")]
    Common(#[from] recon_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", err.to_string()),
            ApiError::Other(ref err) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err.to_string()),
            ApiError::Common(ref err) => {
                let (status, code) = common_status(err);
                (status, code, err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

fn common_status(err: &recon_common::Error) -> (StatusCode, &'static str) {
    use recon_common::Error;
    match err {
        Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        Error::InvalidInput(_) | Error::ColumnNotFound(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        Error::RemoteUnavailable(_) | Error::ExternalApi(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_errors_keep_their_status() {
        let response = ApiError::from(recon_common::Error::Conflict("busy".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ApiError::from(recon_common::Error::Internal("boom".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ApiError::BadRequest("no files".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
