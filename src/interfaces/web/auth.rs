use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use super::error::error_body;

pub async fn require_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // 1. Internal token bypass (the CLI and local jobs calling back)
    if let Some(header) = req.headers().get("x-mosbot-internal-token") {
        if let Ok(val) = header.to_str() {
            if val == state.internal_token {
                return next.run(req).await;
            }
        }
    }

    let any_tokens_exist = state.store.has_any_api_tokens().await.unwrap_or(false);

    // 2. No tokens configured → allow open access only on loopback (safe for local dev)
    if !any_tokens_exist {
        let is_loopback = state.api_host == "127.0.0.1"
            || state.api_host == "::1"
            || state.api_host == "localhost";
        if is_loopback {
            return next.run(req).await;
        }
        return error_body(
            StatusCode::UNAUTHORIZED,
            "No API tokens configured. Create a token before exposing on a non-loopback address.",
        )
        .into_response();
    }

    // 3. Extract and validate the bearer token
    let raw_token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    match raw_token {
        Some(token) if state.store.validate_api_token(&token).await.unwrap_or(false) => {
            next.run(req).await
        }
        Some(_) => error_body(
            StatusCode::UNAUTHORIZED,
            "Invalid or unauthorized API token",
        )
        .into_response(),
        None => error_body(
            StatusCode::UNAUTHORIZED,
            "Missing or invalid Authorization header. Use: Bearer <token>",
        )
        .into_response(),
    }
}
