use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Normalized spawn record extracted from the activity log, independent of
/// which on-disk shape it came from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpawnEvent {
    pub session_label: String,
    pub timestamp: DateTime<Utc>,
}

/// The activity log carries two generations of event shape. The `category`
/// field is the discriminator: present on current events, absent on legacy
/// flat records.
#[derive(Debug)]
enum ActivityEvent {
    LegacySpawn(SpawnEvent),
    OrchestrationSpawn(SpawnEvent),
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySpawnRecord {
    session_label: String,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct OrchestrationRecord {
    category: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    metadata: OrchestrationMetadata,
}

#[derive(Default, Deserialize)]
struct OrchestrationMetadata {
    #[serde(default)]
    session_label: Option<String>,
}

fn classify(value: &Value) -> ActivityEvent {
    if value.get("category").is_some() {
        let Ok(record) = serde_json::from_value::<OrchestrationRecord>(value.clone()) else {
            return ActivityEvent::Other;
        };
        if record.category != "orchestration:spawn" {
            return ActivityEvent::Other;
        }
        match record.metadata.session_label {
            Some(session_label) => ActivityEvent::OrchestrationSpawn(SpawnEvent {
                session_label,
                timestamp: record.timestamp,
            }),
            None => ActivityEvent::Other,
        }
    } else {
        match serde_json::from_value::<LegacySpawnRecord>(value.clone()) {
            Ok(record) => ActivityEvent::LegacySpawn(SpawnEvent {
                session_label: record.session_label,
                timestamp: record.timestamp,
            }),
            Err(_) => ActivityEvent::Other,
        }
    }
}

pub(crate) fn normalize_spawn_event(value: &Value) -> Option<SpawnEvent> {
    match classify(value) {
        ActivityEvent::LegacySpawn(event) | ActivityEvent::OrchestrationSpawn(event) => Some(event),
        ActivityEvent::Other => None,
    }
}

/// First spawn timestamp per session label, in log order.
pub(crate) fn spawn_index(lines: &[Value]) -> HashMap<String, DateTime<Utc>> {
    let mut index = HashMap::new();
    for value in lines {
        if let Some(event) = normalize_spawn_event(value) {
            index.entry(event.session_label).or_insert(event.timestamp);
        }
    }
    index
}
