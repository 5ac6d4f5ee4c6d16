use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::activity::spawn_index;
use super::types::{RuntimeSnapshot, SubagentAttempt, SubagentStatus};
use super::{
    ACTIVE_SPAWNS_FILE, ACTIVITY_LOG_FILE, CollectError, QUEUED_REQUESTS_FILE, RESULTS_CACHE_FILE,
};
use crate::core::store::TaskStore;
use crate::core::workspace::WorkspaceFiles;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveSpawnRecord {
    #[serde(default)]
    session_key: Option<String>,
    #[serde(default)]
    session_label: Option<String>,
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuedRequestRecord {
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    queued_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultsCacheRecord {
    #[serde(default)]
    session_label: Option<String>,
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    cached_at: Option<DateTime<Utc>>,
    #[serde(default)]
    outcome: Option<String>,
}

/// Classified view of the runtime files, optionally narrowed to one task.
///
/// Connectivity failure of the workspace service is the only fatal outcome;
/// missing files and malformed records degrade to empty or partial lists.
pub async fn collect_runtime(
    workspace: &dyn WorkspaceFiles,
    store: &TaskStore,
    task_filter: Option<&str>,
) -> Result<RuntimeSnapshot, CollectError> {
    let (active_lines, queued_object, cache_lines, activity_lines) = tokio::join!(
        workspace.read_json_lines(ACTIVE_SPAWNS_FILE),
        workspace.read_json_object(QUEUED_REQUESTS_FILE),
        workspace.read_json_lines(RESULTS_CACHE_FILE),
        workspace.read_json_lines(ACTIVITY_LOG_FILE),
    );
    let active_lines = active_lines?;
    let queued_object = queued_object?;
    let cache_lines = cache_lines?;
    let activity_lines = activity_lines?;

    let mut running = Vec::new();
    for value in &active_lines {
        let Some(record) = parse_record::<ActiveSpawnRecord>(value, ACTIVE_SPAWNS_FILE) else {
            continue;
        };
        if !matches_filter(&record.task_id, task_filter) {
            continue;
        }
        let mut attempt = SubagentAttempt::new(record.task_id, SubagentStatus::Running);
        attempt.session_key = record.session_key;
        attempt.session_label = record.session_label;
        attempt.model = record.model;
        attempt.started_at = record.started_at;
        running.push(attempt);
    }

    let mut queued = Vec::new();
    let queued_entries = queued_object
        .get("requests")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for value in &queued_entries {
        let Some(record) = parse_record::<QueuedRequestRecord>(value, QUEUED_REQUESTS_FILE) else {
            continue;
        };
        if !matches_filter(&record.task_id, task_filter) {
            continue;
        }
        let mut attempt = SubagentAttempt::new(record.task_id, SubagentStatus::Queued);
        attempt.model = record.model;
        attempt.queued_at = record.queued_at;
        queued.push(attempt);
    }

    let spawn_times = spawn_index(&activity_lines);
    let mut completed = Vec::new();
    for record in dedupe_completed(&cache_lines, task_filter) {
        let mut attempt = SubagentAttempt::new(record.task_id, SubagentStatus::Completed);
        attempt.started_at = record
            .session_label
            .as_ref()
            .and_then(|label| spawn_times.get(label).copied());
        attempt.session_label = record.session_label;
        attempt.completed_at = record.cached_at;
        attempt.outcome = record.outcome;
        attempt.derive_duration();
        completed.push(attempt);
    }

    let mut snapshot = RuntimeSnapshot {
        running,
        queued,
        completed,
    };
    resolve_task_numbers(store, &mut snapshot).await?;
    Ok(snapshot)
}

fn parse_record<T: serde::de::DeserializeOwned>(value: &Value, path: &str) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("skipping unreadable record in {}: {}", path, e);
            None
        }
    }
}

fn matches_filter(task_id: &str, task_filter: Option<&str>) -> bool {
    task_filter.is_none_or(|filter| task_id == filter)
}

/// Repeated cache lines for one session label collapse to the line with the
/// latest `cachedAt`; the whole record is replaced, fields are never merged
/// across duplicates. Lines without a label cannot be deduplicated and pass
/// through unchanged.
fn dedupe_completed(lines: &[Value], task_filter: Option<&str>) -> Vec<ResultsCacheRecord> {
    let mut ordered: Vec<ResultsCacheRecord> = Vec::new();
    let mut index_by_label: HashMap<String, usize> = HashMap::new();

    for value in lines {
        let Some(record) = parse_record::<ResultsCacheRecord>(value, RESULTS_CACHE_FILE) else {
            continue;
        };
        if !matches_filter(&record.task_id, task_filter) {
            continue;
        }
        match &record.session_label {
            Some(label) => match index_by_label.get(label) {
                Some(&at) => {
                    if record.cached_at >= ordered[at].cached_at {
                        ordered[at] = record;
                    }
                }
                None => {
                    index_by_label.insert(label.clone(), ordered.len());
                    ordered.push(record);
                }
            },
            None => ordered.push(record),
        }
    }
    ordered
}

/// One batched lookup for every attempt in the snapshot. Ids missing from
/// the store stay at `task_number: None` but the attempt is kept.
async fn resolve_task_numbers(
    store: &TaskStore,
    snapshot: &mut RuntimeSnapshot,
) -> Result<(), CollectError> {
    let ids: HashSet<String> = snapshot
        .running
        .iter()
        .chain(&snapshot.queued)
        .chain(&snapshot.completed)
        .filter(|attempt| !attempt.task_id.is_empty())
        .map(|attempt| attempt.task_id.clone())
        .collect();
    let numbers = store.find_task_numbers(&ids).await?;

    for attempt in snapshot
        .running
        .iter_mut()
        .chain(&mut snapshot.queued)
        .chain(&mut snapshot.completed)
    {
        attempt.task_number = numbers.get(&attempt.task_id).copied();
    }
    Ok(())
}
