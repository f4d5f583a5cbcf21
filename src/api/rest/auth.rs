use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/auth/login", post(login))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub subject: i64,
    pub role: Role,
    #[serde(default)]
    pub store_ids: Option<Vec<i64>>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// Claims-only token issuance: subject, role, and store membership. The
/// credential check in front of this belongs to an external directory.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let access_token = state
        .jwt
        .create_token(payload.subject, payload.role, payload.store_ids)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}
