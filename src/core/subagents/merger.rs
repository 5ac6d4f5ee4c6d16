use std::collections::{HashMap, HashSet};

use super::CollectError;
use super::collector::collect_runtime;
use super::types::{AttemptSummary, IdentityKey, SubagentAttempt, SubagentStatus};
use crate::core::gateway::{GatewayMessage, GatewaySession, SessionFilter, SessionGateway};
use crate::core::store::TaskStore;
use crate::core::workspace::WorkspaceFiles;

/// Gateway sessions advertise the task they belong to through their display
/// name. This prefix is a convention shared with the spawner.
pub const SESSION_LABEL_PREFIX: &str = "mosbot-task-";

const GATEWAY_LOOKBACK_SECS: u64 = 24 * 60 * 60;
const GATEWAY_SESSION_KIND: &str = "other";
const HISTORY_FETCH_LIMIT: usize = 20;

/// Deduplicated attempt list for one task: runtime files seed the view, the
/// gateway only fills gaps. The caller must have verified the task exists.
pub async fn merge_task_attempts(
    workspace: &dyn WorkspaceFiles,
    gateway: &dyn SessionGateway,
    store: &TaskStore,
    task_id: &str,
) -> Result<(Vec<SubagentAttempt>, AttemptSummary), CollectError> {
    let snapshot = collect_runtime(workspace, store, Some(task_id)).await?;

    let ids: HashSet<String> = [task_id.to_string()].into_iter().collect();
    let task_number = store
        .find_task_numbers(&ids)
        .await?
        .get(task_id)
        .copied();

    let mut attempts: HashMap<IdentityKey, SubagentAttempt> = HashMap::new();
    for attempt in snapshot
        .running
        .into_iter()
        .chain(snapshot.queued)
        .chain(snapshot.completed)
    {
        attempts.insert(attempt.identity(), attempt);
    }

    let filter = SessionFilter {
        active_within_secs: Some(GATEWAY_LOOKBACK_SECS),
        kind: Some(GATEWAY_SESSION_KIND.to_string()),
    };
    if let Some(sessions) = gateway.list_sessions(&filter).await.into_option() {
        for session in sessions {
            if !session_matches_task(&session.display_name, task_id, task_number) {
                continue;
            }
            merge_session(&mut attempts, session, task_id, task_number);
        }
    }

    backfill_outcomes(gateway, &mut attempts).await;

    let mut attempts: Vec<SubagentAttempt> = attempts.into_values().collect();
    attempts.sort_by(|a, b| b.recency().cmp(&a.recency()));
    let summary = AttemptSummary::tally(&attempts);
    Ok((attempts, summary))
}

pub(crate) fn session_matches_task(
    display_name: &str,
    task_id: &str,
    task_number: Option<i64>,
) -> bool {
    if display_name.starts_with(&format!("{SESSION_LABEL_PREFIX}{task_id}-")) {
        return true;
    }
    match task_number {
        Some(number) => display_name.starts_with(&format!("{SESSION_LABEL_PREFIX}{number}-")),
        None => false,
    }
}

/// Merge one gateway session into the identity map.
///
/// A session may match a runtime attempt either by session key or, for
/// completed-cache entries that never learned their key, by label. Runtime
/// status always wins; the gateway only supplies fields the runtime record
/// left null. Sessions with no runtime counterpart insert with a derived
/// status: `failed` when the last run aborted, else a provisional `running`.
fn merge_session(
    attempts: &mut HashMap<IdentityKey, SubagentAttempt>,
    session: GatewaySession,
    task_id: &str,
    task_number: Option<i64>,
) {
    let by_key = IdentityKey::SessionKey(session.key.clone());
    let by_label = IdentityKey::SessionLabel(session.display_name.clone());

    let existing = if attempts.contains_key(&by_key) {
        Some(by_key)
    } else if attempts.contains_key(&by_label) {
        Some(by_label)
    } else {
        None
    };

    match existing {
        Some(identity) => {
            let Some(attempt) = attempts.get_mut(&identity) else {
                return;
            };
            if attempt.session_key.is_none() {
                attempt.session_key = Some(session.key);
            }
            if attempt.model.is_none() {
                attempt.model = session.model;
            }
            if attempt.tokens_used.is_none() {
                attempt.tokens_used = session.total_tokens;
            }
        }
        None => {
            let status = if session.aborted_last_run {
                SubagentStatus::Failed
            } else {
                SubagentStatus::Running
            };
            let mut attempt = SubagentAttempt::new(task_id, status);
            attempt.task_number = task_number;
            attempt.session_key = Some(session.key);
            attempt.session_label = Some(session.display_name);
            attempt.model = session.model;
            attempt.tokens_used = session.total_tokens;
            attempts.insert(attempt.identity(), attempt);
        }
    }
}

/// Fill missing outcomes from the trailing assistant message of each
/// session's history. Per-session failures leave the outcome null and never
/// abort the merge.
async fn backfill_outcomes(
    gateway: &dyn SessionGateway,
    attempts: &mut HashMap<IdentityKey, SubagentAttempt>,
) {
    for attempt in attempts.values_mut() {
        if attempt.outcome.is_some() {
            continue;
        }
        let Some(session_key) = attempt.session_key.clone() else {
            continue;
        };
        if let Some(history) = gateway
            .fetch_history(&session_key, HISTORY_FETCH_LIMIT)
            .await
            .into_option()
        {
            attempt.outcome = last_assistant_message(&history);
        }
    }
}

fn last_assistant_message(history: &[GatewayMessage]) -> Option<String> {
    history
        .iter()
        .rev()
        .find(|message| message.role == "assistant" && !message.text.trim().is_empty())
        .map(|message| message.text.trim().to_string())
}
