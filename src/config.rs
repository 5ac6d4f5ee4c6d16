use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::core::retention::next_purge_at;
use crate::core::subagents::types::RetentionPolicy;

const DEFAULT_COMPLETED_RETENTION_DAYS: u32 = 14;
const DEFAULT_ACTIVITY_RETENTION_DAYS: u32 = 30;
const DEFAULT_PURGE_OFFSET_HOURS: i32 = 2;

/// Hour of day, in the reference timezone, at which the retention purge runs.
pub const PURGE_HOUR: u32 = 3;

#[derive(Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub workspace_url: Option<String>,
    pub workspace_token: Option<String>,
    pub gateway_url: Option<String>,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub completed_retention_days: u32,
    pub activity_log_retention_days: u32,
    /// Constant UTC offset of the reference timezone used for the daily purge.
    pub purge_offset: FixedOffset,
}

impl RetentionConfig {
    pub fn policy_at(&self, now: DateTime<Utc>) -> RetentionPolicy {
        RetentionPolicy {
            completed_retention_days: self.completed_retention_days,
            activity_log_retention_days: self.activity_log_retention_days,
            next_purge_at: next_purge_at(now, self.purge_offset),
        }
    }

    pub fn activity_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.activity_log_retention_days))
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let data_dir = match non_empty_env("MOSBOT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("mosbot"),
        };

        let purge_hours = match non_empty_env("MOSBOT_PURGE_UTC_OFFSET") {
            Some(raw) => raw
                .parse::<i32>()
                .context("MOSBOT_PURGE_UTC_OFFSET must be a whole number of hours")?,
            None => DEFAULT_PURGE_OFFSET_HOURS,
        };
        let purge_offset = FixedOffset::east_opt(purge_hours * 3600)
            .ok_or_else(|| anyhow!("MOSBOT_PURGE_UTC_OFFSET out of range: {purge_hours}"))?;

        Ok(Self {
            data_dir,
            workspace_url: non_empty_env("MOSBOT_WORKSPACE_URL"),
            workspace_token: non_empty_env("MOSBOT_WORKSPACE_TOKEN"),
            gateway_url: non_empty_env("MOSBOT_GATEWAY_URL"),
            retention: RetentionConfig {
                completed_retention_days: env_u32(
                    "MOSBOT_COMPLETED_RETENTION_DAYS",
                    DEFAULT_COMPLETED_RETENTION_DAYS,
                ),
                activity_log_retention_days: env_u32(
                    "MOSBOT_ACTIVITY_RETENTION_DAYS",
                    DEFAULT_ACTIVITY_RETENTION_DAYS,
                ),
                purge_offset,
            },
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
