use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::json;

use super::super::AppState;
use super::super::error::ApiError;

#[derive(serde::Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
}

pub async fn list_tokens(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tokens = state.store.list_api_tokens().await?;
    Ok(Json(json!({ "data": tokens })))
}

pub async fn create_token(
    State(state): State<AppState>,
    Json(payload): Json<CreateTokenRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Token name is required".to_string()));
    }
    let (raw_token, record) = state.store.create_api_token(name).await?;
    Ok(Json(json!({
        "data": {
            "token": raw_token,
            "record": record,
            "message": "Token created. Save the token value - it will not be shown again."
        }
    })))
}

pub async fn delete_token(
    Path(token_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete_api_token(&token_id).await? {
        return Err(ApiError::NotFound("Token not found".to_string()));
    }
    Ok(Json(json!({ "data": { "revoked": true } })))
}
