use anyhow::Result;
use chrono::Utc;
use rusqlite::params;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::TaskStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTokenRecord {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_raw_token() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("mbk_{}", hex::encode(bytes))
}

impl TaskStore {
    pub async fn create_api_token(&self, name: &str) -> Result<(String, ApiTokenRecord)> {
        let raw_token = generate_raw_token();
        let token_hash = hash_token(&raw_token);
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO api_tokens (id, name, token_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, token_hash, created_at],
        )?;

        Ok((
            raw_token,
            ApiTokenRecord {
                id,
                name: name.to_string(),
                created_at,
            },
        ))
    }

    pub async fn list_api_tokens(&self) -> Result<Vec<ApiTokenRecord>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT id, name, created_at FROM api_tokens ORDER BY created_at DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(ApiTokenRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub async fn delete_api_token(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute("DELETE FROM api_tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub async fn validate_api_token(&self, raw_token: &str) -> Result<bool> {
        let token_hash = hash_token(raw_token);
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM api_tokens WHERE token_hash = ?1",
            params![token_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub async fn has_any_api_tokens(&self) -> Result<bool> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM api_tokens", [], |row| row.get(0))?;
        Ok(count > 0)
    }
}
