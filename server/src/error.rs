use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use users_api_protocol::ErrorBody;

use crate::auth::TokenError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Unauthorized(#[from] TokenError),
    #[error("Authentication is not configured")]
    AuthDisabled,
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Too many requests")]
    RateLimited,
    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::AuthDisabled => StatusCode::NOT_IMPLEMENTED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(err) => err.code(),
            ApiError::AuthDisabled => "AUTH_DISABLED",
            ApiError::Validation(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            ApiError::Unauthorized(err) => {
                tracing::warn!(reason = %err, "Rejected credential");
                "Invalid or missing token".to_string()
            }
            ApiError::AuthDisabled => "JWT not configured".to_string(),
            ApiError::Validation(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => msg,
            ApiError::RateLimited => "Too many requests".to_string(),
            ApiError::InternalError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                "Internal Server Error".to_string()
            }
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                "Internal Server Error".to_string()
            }
        };

        (status, Json(ErrorBody::new(code, message))).into_response()
    }
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}
