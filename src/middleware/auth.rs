use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: Option<String>,
}

/// Validate an HS256 access token and extract the caller's user id. Tokens
/// without `type == "access"` (refresh tokens, untyped tokens) are rejected.
pub fn verify_access_token(secret: &str, token: &str) -> AppResult<Uuid> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::TokenInvalid,
    })?;
    if decoded.claims.token_type.as_deref() != Some("access") {
        return Err(AppError::TokenInvalid);
    }
    Uuid::parse_str(&decoded.claims.sub).map_err(|_| AppError::TokenInvalid)
}

/// Bearer gate for the REST surface. On success the caller's user id is
/// stashed in request extensions for the [`crate::middleware::guards::User`]
/// extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;
    let user_id = verify_access_token(&state.config.jwt_secret, token)?;
    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
