//! `POST /auth/token` (§6).

use axum::extract::State;
use axum::Json;
use errors::ApiError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::issue_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String
}

pub async fn token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenRequest>
) -> Result<Json<TokenResponse>, ApiError> {
    let access_token = issue_token(&state, &request.username, &request.password)?;
    Ok(Json(TokenResponse { access_token }))
}
