mod tokens;

pub use tokens::ApiTokenRecord;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub number: i64,
    pub title: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: i64,
    pub task_id: String,
    pub category: String,
    pub message: String,
    pub created_at: String,
}

/// Durable task records and their activity log. Subagent attempts are never
/// stored here; the store only resolves task identity for them.
pub struct TaskStore {
    db: Arc<Mutex<Connection>>,
}

impl TaskStore {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            tokio::fs::create_dir_all(data_dir).await?;
        }

        let db = Connection::open(data_dir.join("mosbot.db"))?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                number INTEGER NOT NULL UNIQUE,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                category TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS api_tokens (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                token_hash TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    // ── Tasks ──

    pub async fn create_task(&self, title: &str) -> Result<Task> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        let db = self.db.lock().await;
        let number: i64 =
            db.query_row("SELECT COALESCE(MAX(number), 0) + 1 FROM tasks", [], |row| {
                row.get(0)
            })?;
        db.execute(
            "INSERT INTO tasks (id, number, title, status, created_at) VALUES (?1, ?2, ?3, 'open', ?4)",
            params![id, number, title, created_at],
        )?;
        Ok(Task {
            id,
            number,
            title: title.to_string(),
            status: "open".to_string(),
            created_at,
        })
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let db = self.db.lock().await;
        let task = db
            .query_row(
                "SELECT id, number, title, status, created_at FROM tasks WHERE id = ?1",
                params![id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT id, number, title, status, created_at FROM tasks ORDER BY number")?;
        let rows = stmt.query_map([], row_to_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    pub async fn update_task_status(&self, id: &str, status: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE tasks SET status = ?2 WHERE id = ?1",
            params![id, status],
        )?;
        Ok(rows > 0)
    }

    pub async fn delete_task(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        db.execute("DELETE FROM activity_log WHERE task_id = ?1", params![id])?;
        let rows = db.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub async fn task_exists(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM tasks WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Batched number lookup: one `IN (...)` query per call, regardless of
    /// how many ids are requested. Unknown ids are simply absent from the map.
    pub async fn find_task_numbers(&self, ids: &HashSet<String>) -> Result<HashMap<String, i64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT id, number FROM tasks WHERE id IN ({placeholders})");
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut numbers = HashMap::new();
        for row in rows {
            let (id, number) = row?;
            numbers.insert(id, number);
        }
        Ok(numbers)
    }

    // ── Activity log ──

    pub async fn add_activity(
        &self,
        task_id: &str,
        category: &str,
        message: &str,
    ) -> Result<ActivityEntry> {
        let created_at = Utc::now().to_rfc3339();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO activity_log (task_id, category, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![task_id, category, message, created_at],
        )?;
        let id = db.last_insert_rowid();
        Ok(ActivityEntry {
            id,
            task_id: task_id.to_string(),
            category: category.to_string(),
            message: message.to_string(),
            created_at,
        })
    }

    pub async fn list_activity(&self, task_id: &str) -> Result<Vec<ActivityEntry>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, task_id, category, message, created_at FROM activity_log
             WHERE task_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok(ActivityEntry {
                id: row.get(0)?,
                task_id: row.get(1)?,
                category: row.get(2)?,
                message: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Time-windowed delete used by the retention job. Timestamps are stored
    /// as RFC 3339 UTC strings, so lexicographic comparison is sound.
    pub async fn purge_activity_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "DELETE FROM activity_log WHERE created_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(rows)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        number: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
pub(crate) async fn test_store() -> TaskStore {
    let dir = std::env::temp_dir().join(format!("mosbot-test-{}", uuid::Uuid::new_v4().simple()));
    std::fs::create_dir_all(&dir).expect("temp test dir should be created");
    TaskStore::open(&dir).await.expect("test store should open")
}
