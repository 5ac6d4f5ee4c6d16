use chrono::{DateTime, Utc};

use super::CollectError;
use super::collector::collect_runtime;
use super::types::FleetView;
use crate::config::RetentionConfig;
use crate::core::store::TaskStore;
use crate::core::workspace::WorkspaceFiles;

/// Fleet-wide dashboard view: every task's runtime state plus retention
/// metadata. No gateway enrichment on this path. `now` is injected so the
/// derived purge instant is a pure function of the clock.
pub async fn fleet_view(
    workspace: &dyn WorkspaceFiles,
    store: &TaskStore,
    retention: &RetentionConfig,
    now: DateTime<Utc>,
) -> Result<FleetView, CollectError> {
    let snapshot = collect_runtime(workspace, store, None).await?;
    Ok(FleetView {
        running: snapshot.running,
        queued: snapshot.queued,
        completed: snapshot.completed,
        retention: retention.policy_at(now),
    })
}
