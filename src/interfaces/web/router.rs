use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::get,
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::auth;
use super::handlers::{files, subagents, tasks, tokens};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route(
            "/api/tasks/{id}/activity",
            get(tasks::list_activity).post(tasks::add_activity),
        )
        .route("/api/tasks/{id}/subagents", get(tasks::get_task_subagents))
        .route("/api/subagents", get(subagents::get_fleet_subagents))
        .route("/api/files/{*path}", get(files::read_workspace_file))
        .route(
            "/api/tokens",
            get(tokens::list_tokens).post(tokens::create_token),
        )
        .route(
            "/api/tokens/{token_id}",
            axum::routing::delete(tokens::delete_token),
        )
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::testing::{StaticGateway, session};
    use crate::core::subagents::{ACTIVE_SPAWNS_FILE, RESULTS_CACHE_FILE};
    use crate::core::workspace::testing::StaticWorkspace;
    use crate::interfaces::web::testing::{state_with, test_state};
    use axum::http::StatusCode;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use tower::util::ServiceExt;

    async fn json_request(
        app: Router,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };

        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .header("x-mosbot-internal-token", "test-internal-token")
            .body(body)
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes).unwrap_or(serde_json::json!({}));
        (status, json)
    }

    #[tokio::test]
    async fn security_headers_present_on_responses() {
        let state = test_state().await;
        let app = build_api_router(state);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/tasks")
            .header("x-mosbot-internal-token", "test-internal-token")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn fleet_view_with_missing_files_is_200_with_empty_arrays() {
        let state = test_state().await;
        let app = build_api_router(state);
        let (status, json) = json_request(app, Method::GET, "/api/subagents", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["running"].as_array().unwrap().len(), 0);
        assert_eq!(json["data"]["queued"].as_array().unwrap().len(), 0);
        assert_eq!(json["data"]["completed"].as_array().unwrap().len(), 0);
        assert_eq!(json["data"]["retention"]["completedRetentionDays"], 14);
        assert_eq!(json["data"]["retention"]["activityLogRetentionDays"], 30);
        assert!(json["data"]["retention"]["nextPurgeAt"].is_string());
    }

    #[tokio::test]
    async fn fleet_view_returns_503_when_workspace_unreachable() {
        let state = state_with(
            Arc::new(StaticWorkspace::unavailable()),
            Arc::new(StaticGateway::default()),
        )
        .await;
        let app = build_api_router(state);
        let (status, json) = json_request(app, Method::GET, "/api/subagents", None).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"]["status"], 503);
    }

    #[tokio::test]
    async fn fleet_view_returns_503_when_workspace_not_configured() {
        let state = state_with(
            Arc::new(StaticWorkspace::not_configured()),
            Arc::new(StaticGateway::default()),
        )
        .await;
        let app = build_api_router(state);
        let (status, json) = json_request(app, Method::GET, "/api/subagents", None).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"]["status"], 503);
    }

    #[tokio::test]
    async fn task_subagents_for_missing_task_is_404_without_gateway_calls() {
        let gateway = Arc::new(StaticGateway::default());
        let state = state_with(Arc::new(StaticWorkspace::empty()), gateway.clone()).await;
        let app = build_api_router(state);

        let missing = uuid::Uuid::new_v4();
        let (status, json) = json_request(
            app,
            Method::GET,
            &format!("/api/tasks/{missing}/subagents"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["message"], "Task not found");
        assert_eq!(json["error"]["status"], 404);
        assert_eq!(gateway.list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn task_subagents_returns_503_when_workspace_unreachable() {
        let mut state = test_state().await;
        let task = state.store.create_task("t").await.unwrap();
        state.workspace = Arc::new(StaticWorkspace::unavailable());
        let app = build_api_router(state);

        let (status, json) = json_request(
            app,
            Method::GET,
            &format!("/api/tasks/{}/subagents", task.id),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"]["status"], 503);
    }

    #[tokio::test]
    async fn task_subagents_merges_runtime_and_gateway() {
        let mut state = test_state().await;
        let task = state.store.create_task("deploy fix").await.unwrap();

        let active_line = serde_json::json!({
            "sessionKey": "agent:main:subagent:abc",
            "sessionLabel": format!("mosbot-task-{}-001", task.id),
            "taskId": task.id,
            "startedAt": "2026-02-10T09:00:00Z"
        })
        .to_string();
        state.workspace = Arc::new(StaticWorkspace::with_files(&[(
            ACTIVE_SPAWNS_FILE,
            active_line.as_str(),
        )]));

        let mut aborted = session(
            "agent:main:subagent:xyz",
            &format!("mosbot-task-{}-002", task.id),
        );
        aborted.aborted_last_run = true;
        state.gateway = Arc::new(StaticGateway::with_sessions(vec![aborted]));

        let app = build_api_router(state);
        let (status, json) = json_request(
            app,
            Method::GET,
            &format!("/api/tasks/{}/subagents", task.id),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let attempts = json["data"].as_array().unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(json["meta"]["total"], 2);
        assert_eq!(json["meta"]["running"], 1);
        assert_eq!(json["meta"]["failed"], 1);

        let running = attempts
            .iter()
            .find(|a| a["status"] == "running")
            .unwrap();
        assert_eq!(running["sessionKey"], "agent:main:subagent:abc");
        assert_eq!(running["taskNumber"], task.number);
        assert!(running["tokensUsed"].is_null());
    }

    #[tokio::test]
    async fn task_crud_roundtrip() {
        let state = test_state().await;

        let app = build_api_router(state.clone());
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/tasks",
            Some(serde_json::json!({ "title": "Ship the release" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = json["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(json["data"]["number"], 1);
        assert_eq!(json["data"]["status"], "open");

        let app = build_api_router(state.clone());
        let (status, json) =
            json_request(app, Method::GET, &format!("/api/tasks/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["title"], "Ship the release");

        let app = build_api_router(state.clone());
        let (status, json) = json_request(
            app,
            Method::PATCH,
            &format!("/api/tasks/{id}"),
            Some(serde_json::json!({ "status": "done" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "done");

        let app = build_api_router(state.clone());
        let (status, _) =
            json_request(app, Method::DELETE, &format!("/api/tasks/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let app = build_api_router(state);
        let (status, json) =
            json_request(app, Method::GET, &format!("/api/tasks/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["message"], "Task not found");
    }

    #[tokio::test]
    async fn create_task_without_title_is_400() {
        let state = test_state().await;
        let app = build_api_router(state);
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/tasks",
            Some(serde_json::json!({ "title": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["status"], 400);
    }

    #[tokio::test]
    async fn activity_roundtrip() {
        let state = test_state().await;
        let task = state.store.create_task("t").await.unwrap();

        let app = build_api_router(state.clone());
        let (status, _) = json_request(
            app,
            Method::POST,
            &format!("/api/tasks/{}/activity", task.id),
            Some(serde_json::json!({ "category": "note", "message": "kicked off" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let app = build_api_router(state);
        let (status, json) = json_request(
            app,
            Method::GET,
            &format!("/api/tasks/{}/activity", task.id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let entries = json["data"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "kicked off");
    }

    #[tokio::test]
    async fn workspace_file_proxy_returns_content_or_404() {
        let state = state_with(
            Arc::new(StaticWorkspace::with_files(&[(
                RESULTS_CACHE_FILE,
                "cached contents",
            )])),
            Arc::new(StaticGateway::default()),
        )
        .await;

        let app = build_api_router(state.clone());
        let req = Request::builder()
            .method(Method::GET)
            .uri(format!("/api/files/{RESULTS_CACHE_FILE}"))
            .header("x-mosbot-internal-token", "test-internal-token")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"cached contents");

        let app = build_api_router(state);
        let (status, json) =
            json_request(app, Method::GET, "/api/files/nope.jsonl", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["status"], 404);
    }

    #[tokio::test]
    async fn token_create_and_revoke_roundtrip() {
        let state = test_state().await;

        let app = build_api_router(state.clone());
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/tokens",
            Some(serde_json::json!({ "name": "ci" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["data"]["token"].as_str().unwrap().starts_with("mbk_"));
        let token_id = json["data"]["record"]["id"].as_str().unwrap().to_string();

        let app = build_api_router(state.clone());
        let (_, json) = json_request(app, Method::GET, "/api/tokens", None).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 1);

        let app = build_api_router(state);
        let (status, json) = json_request(
            app,
            Method::DELETE,
            &format!("/api/tokens/{token_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["revoked"], true);
    }

    #[tokio::test]
    async fn method_not_allowed_returns_405() {
        let state = test_state().await;
        let app = build_api_router(state);
        let req = Request::builder()
            .method(Method::PATCH)
            .uri("/api/subagents")
            .header("x-mosbot-internal-token", "test-internal-token")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn api_route_contract_has_all_expected_paths() {
        let paths = [
            "/api/tasks",
            "/api/tasks/some-task",
            "/api/tasks/some-task/activity",
            "/api/tasks/some-task/subagents",
            "/api/subagents",
            "/api/files/results-cache.jsonl",
            "/api/tokens",
            "/api/tokens/token_1",
            "/api/logs",
        ];

        assert_eq!(paths.len(), 9, "Expected exactly 9 API routes");

        let unique: HashSet<&str> = paths.iter().copied().collect();
        assert_eq!(unique.len(), 9, "Duplicate routes found in route contract");

        let app = build_api_router(test_state().await);
        for path in paths {
            let req = Request::builder()
                .method(Method::PUT)
                .uri(path)
                .header("x-mosbot-internal-token", "test-internal-token")
                .body(Body::empty())
                .expect("request should build");
            let resp = app
                .clone()
                .oneshot(req)
                .await
                .expect("router oneshot should succeed");
            assert_ne!(
                resp.status(),
                StatusCode::NOT_FOUND,
                "Route missing from router: {}",
                path
            );
        }
    }
}
