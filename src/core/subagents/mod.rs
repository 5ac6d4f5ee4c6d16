mod activity;
pub mod aggregator;
pub mod collector;
pub mod merger;
pub mod types;

use crate::core::workspace::WorkspaceError;

/// Runtime files maintained by the workspace service.
pub const ACTIVE_SPAWNS_FILE: &str = "spawn-active.jsonl";
pub const QUEUED_REQUESTS_FILE: &str = "spawn-requests.json";
pub const RESULTS_CACHE_FILE: &str = "results-cache.jsonl";
pub const ACTIVITY_LOG_FILE: &str = "activity-log.jsonl";

/// Failure classes of an aggregation read. Only the workspace variant maps
/// to a 503; store failures are internal errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
