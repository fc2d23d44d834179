use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::AppError;

/// Wire shape of every error the service emits.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

pub fn map_error(err: &AppError) -> (StatusCode, ErrorBody) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        // Full detail stays in the logs; the wire gets an opaque message.
        tracing::error!(error = %err, "internal error");
    }
    (
        status,
        ErrorBody {
            error: err.public_message(),
            code: err.error_code().to_string(),
        },
    )
}

pub fn into_response(err: AppError) -> Response {
    let (status, body) = map_error(&err);
    (status, Json(body)).into_response()
}
