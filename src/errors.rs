use crate::services::object_store_client::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => AppError::not_found(err.to_string()),
            StorageError::InvalidName(_) => AppError::bad_request(err.to_string()),
            StorageError::SignatureExpired | StorageError::SignatureInvalid => {
                AppError::new(StatusCode::FORBIDDEN, err.to_string())
            }
            StorageError::Timeout { .. } => {
                AppError::new(StatusCode::GATEWAY_TIMEOUT, err.to_string())
            }
            StorageError::WriteNotVisible(_)
            | StorageError::Signing(_)
            | StorageError::Backend(_) => {
                tracing::error!(error = %err, "storage backend failure");
                AppError::new(StatusCode::BAD_GATEWAY, format!("storage backend error: {}", err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status_of(err: StorageError) -> StatusCode {
        AppError::from(err).status
    }

    #[test]
    fn storage_errors_map_to_distinct_statuses() {
        assert_eq!(
            status_of(StorageError::NotFound("cat.png".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(StorageError::InvalidName(String::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(StorageError::SignatureExpired),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(StorageError::Timeout {
                operation: "list",
                after: Duration::from_secs(30),
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(StorageError::Backend(object_store::Error::NotImplemented)),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn message_names_the_object() {
        let err = AppError::from(StorageError::NotFound("cat.png".into()));
        assert!(err.message.contains("cat.png"));
    }
}
