//! Single-account JWT bearer auth (ambient, §6: "session auth (single-account
//! password with bearer token)"). `POST /auth/token` checks the submitted
//! credentials against `DEFAULT_USER`/`DEFAULT_PASSWORD`; every other
//! `/api/v1` route requires `Authorization: Bearer <jwt>`.

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use errors::ApiError;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize
}

/// Issues a JWT for `username` if it matches the configured single account,
/// valid for `token_ttl_secs`.
pub fn issue_token(state: &AppState, username: &str, password: &str) -> Result<String, ApiError> {
    if username != state.config.auth.default_user || password != state.config.auth.default_password {
        return Err(ApiError::Unauthorized { reason: "invalid username or password".to_string() });
    }

    let exp = (Utc::now().timestamp() as usize) + state.config.auth.token_ttl_secs as usize;
    let claims = Claims { sub: username.to_string(), exp };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(state.config.auth.jwt_secret.as_bytes()))
        .map_err(|e| ApiError::Internal { reason: format!("token signing failed: {e}") })
}

fn verify_token(state: &AppState, token: &str) -> Result<(), ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.auth.jwt_secret.as_bytes()),
        &Validation::default()
    )
    .map(|_| ())
    .map_err(|e| ApiError::Unauthorized { reason: format!("invalid token: {e}") })
}

/// Axum middleware layer: every route it wraps requires a valid bearer
/// token. Mounted on everything under `/api/v1` except `/auth/token` and
/// `/ping` (those are routed outside this layer, see `routes.rs`).
pub async fn require_bearer_token(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized { reason: "missing bearer token".to_string() })?;

    verify_token(&state, token)?;
    Ok(next.run(request).await)
}
