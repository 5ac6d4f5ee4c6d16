use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Unknown,
}

/// A single execution attempt of a subagent working on a task.
///
/// Attempts have no persistence of their own: every read recomputes them
/// from the runtime files, the gateway, and the task store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentAttempt {
    pub task_id: String,
    pub task_number: Option<i64>,
    pub session_key: Option<String>,
    pub session_label: Option<String>,
    pub status: SubagentStatus,
    pub model: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
    pub tokens_used: Option<i64>,
    pub duration_seconds: Option<i64>,
}

impl SubagentAttempt {
    pub fn new(task_id: impl Into<String>, status: SubagentStatus) -> Self {
        Self {
            task_id: task_id.into(),
            task_number: None,
            session_key: None,
            session_label: None,
            status,
            model: None,
            started_at: None,
            queued_at: None,
            completed_at: None,
            outcome: None,
            tokens_used: None,
            duration_seconds: None,
        }
    }

    /// Identity for cross-source deduplication: session key when known, else
    /// session label, else a synthetic key. The synthetic key carries the
    /// status category so anonymous running/queued/completed attempts for
    /// the same task never collide.
    pub fn identity(&self) -> IdentityKey {
        if let Some(key) = &self.session_key {
            return IdentityKey::SessionKey(key.clone());
        }
        if let Some(label) = &self.session_label {
            return IdentityKey::SessionLabel(label.clone());
        }
        IdentityKey::Synthetic(self.status, self.task_id.clone())
    }

    /// Most recent of the three lifecycle timestamps.
    pub fn recency(&self) -> Option<DateTime<Utc>> {
        [self.started_at, self.queued_at, self.completed_at]
            .into_iter()
            .flatten()
            .max()
    }

    /// Duration is derived, never estimated: it exists exactly when both
    /// endpoints are known.
    pub fn derive_duration(&mut self) {
        self.duration_seconds = match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some((completed - started).num_seconds()),
            _ => None,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    SessionKey(String),
    SessionLabel(String),
    Synthetic(SubagentStatus, String),
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    pub running: Vec<SubagentAttempt>,
    pub queued: Vec<SubagentAttempt>,
    pub completed: Vec<SubagentAttempt>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub completed_retention_days: u32,
    pub activity_log_retention_days: u32,
    pub next_purge_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetView {
    pub running: Vec<SubagentAttempt>,
    pub queued: Vec<SubagentAttempt>,
    pub completed: Vec<SubagentAttempt>,
    pub retention: RetentionPolicy,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct AttemptSummary {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub queued: usize,
}

impl AttemptSummary {
    pub fn tally(attempts: &[SubagentAttempt]) -> Self {
        let mut summary = Self {
            total: attempts.len(),
            ..Self::default()
        };
        for attempt in attempts {
            match attempt.status {
                SubagentStatus::Running => summary.running += 1,
                SubagentStatus::Completed => summary.completed += 1,
                SubagentStatus::Failed => summary.failed += 1,
                SubagentStatus::Queued => summary.queued += 1,
                SubagentStatus::Unknown => {}
            }
        }
        summary
    }
}
