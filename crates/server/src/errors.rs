use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::types::ErrorBody;
use service::auth::AuthError;
use service::DatabaseError;
use thiserror::Error;
use tracing::{debug, error};

/// Shown instead of driver or cipher details.
pub const INTERNAL_ERROR_MESSAGE: &str = "Server Error. Please try again";

/// JSON error response: `{"error": message}` with a mapped status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        let status = match &e {
            DatabaseError::BadData(_) => StatusCode::BAD_REQUEST,
            DatabaseError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            DatabaseError::NotFound(_) => StatusCode::NOT_FOUND,
            DatabaseError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            DatabaseError::Encryption(_) | DatabaseError::Db(_) => {
                error!(kind = e.kind(), error = %e, "database failure");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE);
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        debug!(code = e.code(), error = %e, "auth request rejected");
        match e {
            AuthError::Database(db) => db.into(),
            AuthError::Validation(_) => Self::bad_request(e.to_string()),
            AuthError::Conflict => Self::new(StatusCode::CONFLICT, e.to_string()),
            AuthError::Unauthorized => Self::unauthorized(e.to_string()),
            AuthError::TokenError(detail) => {
                error!(error = %detail, "token handling failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("database unavailable: {0}")]
    Database(String),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}
