pub(crate) mod auth;
pub(crate) mod error;
mod handlers;
mod router;

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tracing::info;

use crate::config::RetentionConfig;
use crate::core::gateway::SessionGateway;
use crate::core::store::TaskStore;
use crate::core::workspace::WorkspaceFiles;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<TaskStore>,
    pub(crate) workspace: Arc<dyn WorkspaceFiles>,
    pub(crate) gateway: Arc<dyn SessionGateway>,
    pub(crate) retention: RetentionConfig,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) api_host: String,
    pub(crate) api_port: u16,
    pub(crate) internal_token: String,
}

pub(crate) struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.state.api_host, self.state.api_port);
        let app = router::build_api_router(self.state);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("mosbot API running at http://{addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::FixedOffset;

    use super::*;
    use crate::core::gateway::testing::StaticGateway;
    use crate::core::workspace::testing::StaticWorkspace;

    pub(crate) async fn state_with(
        workspace: Arc<dyn WorkspaceFiles>,
        gateway: Arc<dyn SessionGateway>,
    ) -> AppState {
        let store = Arc::new(crate::core::store::test_store().await);
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        AppState {
            store,
            workspace,
            gateway,
            retention: RetentionConfig {
                completed_retention_days: 14,
                activity_log_retention_days: 30,
                purge_offset: FixedOffset::east_opt(2 * 3600).expect("valid offset"),
            },
            log_tx,
            api_host: "127.0.0.1".to_string(),
            api_port: 8790,
            internal_token: "test-internal-token".to_string(),
        }
    }

    pub(crate) async fn test_state() -> AppState {
        state_with(
            Arc::new(StaticWorkspace::empty()),
            Arc::new(StaticGateway::default()),
        )
        .await
    }
}
