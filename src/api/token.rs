use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::{Form, Json};
use serde::Deserialize;

use crate::auth::models::AccessToken;
use crate::error::AppError;
use crate::state::AppState;

/// Form body of `POST /token`.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

/// Axum handler for `POST /token`.
pub async fn token_handler(
    State(state): State<AppState>,
    request: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Json<AccessToken>, AppError> {
    let Form(request) = request?;
    match state
        .identity
        .issue_token(&request.username, &request.password)
        .await
    {
        Ok(token) => {
            tracing::info!(username = %request.username, "token issued");
            Ok(Json(token))
        }
        Err(e) => {
            tracing::warn!(username = %request.username, "token request rejected");
            Err(e)
        }
    }
}
