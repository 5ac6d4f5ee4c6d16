use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use super::super::AppState;
use super::super::error::ApiError;

/// Proxy read of a single workspace file. Missing files are a 404 here,
/// unlike the aggregation paths where they degrade to empty lists.
pub async fn read_workspace_file(
    Path(path): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    match state.workspace.read_file(&path).await? {
        Some(content) => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            content,
        )
            .into_response()),
        None => Err(ApiError::NotFound(format!("File not found: {path}"))),
    }
}
