use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::json;

use super::super::AppState;
use super::super::error::ApiError;
use crate::core::subagents::aggregator::fleet_view;

pub async fn get_fleet_subagents(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let view = fleet_view(
        state.workspace.as_ref(),
        &state.store,
        &state.retention,
        Utc::now(),
    )
    .await?;
    Ok(Json(json!({ "data": view })))
}
