use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::json;

use super::super::AppState;
use super::super::error::ApiError;
use crate::core::subagents::merger::merge_task_attempts;

#[derive(serde::Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
}

#[derive(serde::Deserialize)]
pub struct UpdateTaskRequest {
    pub status: String,
}

#[derive(serde::Deserialize)]
pub struct AddActivityRequest {
    pub category: String,
    pub message: String,
}

pub async fn list_tasks(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tasks = state.store.list_tasks().await?;
    Ok(Json(json!({ "data": tasks })))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }
    let task = state.store.create_task(title).await?;
    Ok(Json(json!({ "data": task })))
}

pub async fn get_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.store.get_task(&id).await? {
        Some(task) => Ok(Json(json!({ "data": task }))),
        None => Err(ApiError::NotFound("Task not found".to_string())),
    }
}

pub async fn update_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = payload.status.trim();
    if status.is_empty() {
        return Err(ApiError::BadRequest("status is required".to_string()));
    }
    if !state.store.update_task_status(&id, status).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    let task = state.store.get_task(&id).await?;
    Ok(Json(json!({ "data": task })))
}

pub async fn delete_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete_task(&id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    Ok(Json(json!({ "data": { "deleted": true } })))
}

pub async fn list_activity(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.task_exists(&id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    let entries = state.store.list_activity(&id).await?;
    Ok(Json(json!({ "data": entries })))
}

pub async fn add_activity(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<AddActivityRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.task_exists(&id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    let category = payload.category.trim();
    let message = payload.message.trim();
    if category.is_empty() || message.is_empty() {
        return Err(ApiError::BadRequest(
            "category and message are required".to_string(),
        ));
    }
    let entry = state.store.add_activity(&id, category, message).await?;
    Ok(Json(json!({ "data": entry })))
}

/// Task-scoped subagent view. The existence check runs before any
/// aggregation work so a missing task never triggers file or gateway reads.
pub async fn get_task_subagents(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.task_exists(&id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    let (attempts, summary) = merge_task_attempts(
        state.workspace.as_ref(),
        state.gateway.as_ref(),
        &state.store,
        &id,
    )
    .await?;
    Ok(Json(json!({ "data": attempts, "meta": summary })))
}
