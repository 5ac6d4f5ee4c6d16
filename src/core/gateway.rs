use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a best-effort gateway call. `Unavailable` covers every failure
/// mode (unreachable, timeout, malformed response) and callers treat it as
/// "no enrichment", never as a request error.
#[derive(Debug)]
pub enum Enrichment<T> {
    Available(T),
    Unavailable,
}

impl<T> Enrichment<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Enrichment::Available(value) => Some(value),
            Enrichment::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Only sessions updated within this many seconds.
    pub active_within_secs: Option<u64>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySession {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub total_tokens: Option<i64>,
    #[serde(default)]
    pub aborted_last_run: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayMessage {
    pub role: String,
    #[serde(default)]
    pub text: String,
}

/// Session introspection on the agent-runtime gateway. Both operations are
/// best-effort; a failing gateway must never fail an aggregation.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    async fn list_sessions(&self, filter: &SessionFilter) -> Enrichment<Vec<GatewaySession>>;

    async fn fetch_history(
        &self,
        session_key: &str,
        limit: usize,
    ) -> Enrichment<Vec<GatewayMessage>>;
}

pub struct HttpGatewayClient {
    client: Client,
    base_url: Option<String>,
}

impl HttpGatewayClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<serde_json::Value> {
        let base_url = self
            .base_url
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("gateway not configured"))?;
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SessionGateway for HttpGatewayClient {
    async fn list_sessions(&self, filter: &SessionFilter) -> Enrichment<Vec<GatewaySession>> {
        let mut query = Vec::new();
        if let Some(secs) = filter.active_within_secs {
            query.push(("activeWithinSecs", secs.to_string()));
        }
        if let Some(kind) = &filter.kind {
            query.push(("kind", kind.clone()));
        }

        match self.get_json("/sessions", &query).await {
            Ok(body) => match serde_json::from_value::<Vec<GatewaySession>>(
                body.get("sessions").cloned().unwrap_or_default(),
            ) {
                Ok(sessions) => Enrichment::Available(sessions),
                Err(e) => {
                    debug!("gateway session list unreadable: {}", e);
                    Enrichment::Unavailable
                }
            },
            Err(e) => {
                debug!("gateway session list unavailable: {}", e);
                Enrichment::Unavailable
            }
        }
    }

    async fn fetch_history(
        &self,
        session_key: &str,
        limit: usize,
    ) -> Enrichment<Vec<GatewayMessage>> {
        let path = format!("/sessions/{}/history", session_key);
        let query = [("limit", limit.to_string())];

        match self.get_json(&path, &query).await {
            Ok(body) => match serde_json::from_value::<Vec<GatewayMessage>>(
                body.get("messages").cloned().unwrap_or_default(),
            ) {
                Ok(messages) => Enrichment::Available(messages),
                Err(e) => {
                    debug!("gateway history unreadable for {}: {}", session_key, e);
                    Enrichment::Unavailable
                }
            },
            Err(e) => {
                debug!("gateway history unavailable for {}: {}", session_key, e);
                Enrichment::Unavailable
            }
        }
    }
}
