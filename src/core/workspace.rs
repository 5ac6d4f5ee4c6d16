use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The single failure class that aborts a request. Everything below this
/// (missing file, malformed content) degrades to an empty result instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace file service is not configured")]
    NotConfigured,
    #[error("workspace file service unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the files maintained by the external workspace service.
///
/// `read_file` is the only transport-level operation; the JSON helpers are
/// derived from it and share its fail-open content semantics: a missing file
/// is an empty result, a malformed line or document is skipped with a
/// warning, and only connectivity problems surface as `WorkspaceError`.
#[async_trait]
pub trait WorkspaceFiles: Send + Sync {
    /// `Ok(None)` when the file does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<String>, WorkspaceError>;

    async fn read_json_lines(&self, path: &str) -> Result<Vec<serde_json::Value>, WorkspaceError> {
        let Some(content) = self.read_file(path).await? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => records.push(value),
                Err(e) => warn!("skipping malformed line in {}: {}", path, e),
            }
        }
        Ok(records)
    }

    async fn read_json_object(&self, path: &str) -> Result<serde_json::Value, WorkspaceError> {
        let Some(content) = self.read_file(path).await? else {
            return Ok(serde_json::json!({}));
        };
        match serde_json::from_str(&content) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("treating malformed {} as empty: {}", path, e);
                Ok(serde_json::json!({}))
            }
        }
    }
}

pub struct HttpWorkspaceClient {
    client: Client,
    base_url: Option<String>,
    token: Option<String>,
}

impl HttpWorkspaceClient {
    pub fn new(base_url: Option<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
        }
    }
}

#[async_trait]
impl WorkspaceFiles for HttpWorkspaceClient {
    async fn read_file(&self, path: &str) -> Result<Option<String>, WorkspaceError> {
        let Some(base_url) = &self.base_url else {
            return Err(WorkspaceError::NotConfigured);
        };

        let url = format!("{}/files/{}", base_url.trim_end_matches('/'), path);
        let mut request = self.client.get(&url).timeout(REQUEST_TIMEOUT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| WorkspaceError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(WorkspaceError::Unavailable(format!(
                "unexpected status {} for {}",
                response.status(),
                path
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| WorkspaceError::Unavailable(e.to_string()))?;
        Ok(Some(content))
    }
}
