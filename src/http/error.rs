use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::service::{ErrorKind, ServiceError};

/// A service error on its way out as `{message}` JSON.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::InvalidData => {
                StatusCode::BAD_REQUEST
            }
            // The delete guard answers 400 like the other client errors
            ErrorKind::Conflict if matches!(self.0, ServiceError::InUse(_)) => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::StoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "message": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Body for unknown routes
pub fn not_found_body() -> serde_json::Value {
    json!({ "message": "404 Not Found" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServiceError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::NotFound("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (ServiceError::InUse("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::InvalidData("x".into()), StatusCode::BAD_REQUEST),
            (
                ServiceError::Store(StoreError::Rejected("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::BrokenReference("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
