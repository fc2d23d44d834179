use crate::middleware::error_handling;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_handling::into_response(self)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("token has expired")]
    TokenExpired,

    #[error("token is invalid")]
    TokenInvalid,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UserNotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("unsupported message type: {0}")]
    Unsupported(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) | AppError::Unsupported(_) => 400,
            AppError::Unauthorized | AppError::TokenExpired | AppError::TokenInvalid => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) | AppError::UserNotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Encryption(_)
            | AppError::Internal => 500,
        }
    }

    /// Stable wire code, shared by the HTTP error body and the WS error event.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::TokenExpired => "token_expired",
            AppError::TokenInvalid => "token_invalid",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::UserNotFound(_) => "user_not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Unsupported(_) => "unsupported_type",
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Encryption(_)
            | AppError::Internal => "internal_error",
        }
    }

    /// Message safe to put on the wire. Server-side failures collapse to an
    /// opaque line; the full detail is logged where the error is mapped.
    pub fn public_message(&self) -> String {
        if self.status_code() >= 500 {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}
