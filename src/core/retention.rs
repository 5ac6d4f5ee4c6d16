use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::config::{PURGE_HOUR, RetentionConfig};
use crate::core::store::TaskStore;

/// Next occurrence of the daily purge instant, expressed in UTC.
///
/// The purge fires at `PURGE_HOUR` wall-clock time in a reference timezone
/// with a constant UTC offset. Pure in `now` so callers can inject a clock.
pub fn next_purge_at(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let shift = Duration::seconds(i64::from(offset.local_minus_utc()));
    let wall_now = now + shift;
    let purge_time = NaiveTime::from_hms_opt(PURGE_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut wall_purge = wall_now.date_naive().and_time(purge_time).and_utc();
    if wall_now >= wall_purge {
        wall_purge += Duration::hours(24);
    }
    wall_purge - shift
}

/// One purge pass over the activity log.
pub async fn run_purge(store: &TaskStore, retention: &RetentionConfig) -> Result<usize> {
    let cutoff = retention.activity_cutoff(Utc::now());
    let removed = store.purge_activity_older_than(cutoff).await?;
    info!("retention purge removed {} activity entries", removed);
    Ok(removed)
}

/// Registers the daily purge with the runtime scheduler. The cron hour is
/// the purge hour translated from the reference timezone into UTC.
pub async fn start_purge_scheduler(
    store: Arc<TaskStore>,
    retention: RetentionConfig,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow!("failed to create scheduler: {}", e))?;

    let cron = format!("0 0 {} * * *", purge_hour_utc(retention.purge_offset));
    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let store = store.clone();
        Box::pin(async move {
            if let Err(e) = run_purge(&store, &retention).await {
                warn!("retention purge failed: {}", e);
            }
        })
    })
    .map_err(|e| anyhow!("invalid purge schedule '{}': {}", cron, e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow!("failed to register purge job: {}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow!("failed to start scheduler: {}", e))?;
    Ok(scheduler)
}

fn purge_hour_utc(offset: FixedOffset) -> i32 {
    let offset_hours = offset.local_minus_utc() / 3600;
    (PURGE_HOUR as i32 - offset_hours).rem_euclid(24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn offset_hours(h: i32) -> FixedOffset {
        FixedOffset::east_opt(h * 3600).expect("offset should be valid")
    }

    #[test]
    fn before_local_purge_hour_returns_today() {
        // 00:30 UTC is 02:30 at UTC+2, before the 03:00 purge.
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 0, 30, 0).unwrap();
        let next = next_purge_at(now, offset_hours(2));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 10, 1, 0, 0).unwrap());
    }

    #[test]
    fn at_or_after_local_purge_hour_returns_tomorrow() {
        // 01:00 UTC is exactly 03:00 at UTC+2.
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 1, 0, 0).unwrap();
        let next = next_purge_at(now, offset_hours(2));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 11, 1, 0, 0).unwrap());

        let later = Utc.with_ymd_and_hms(2026, 2, 10, 15, 0, 0).unwrap();
        let next = next_purge_at(later, offset_hours(2));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 11, 1, 0, 0).unwrap());
    }

    #[test]
    fn negative_offsets_convert_back_to_utc() {
        // 03:00 at UTC-5 is 08:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 7, 59, 0).unwrap();
        let next = next_purge_at(now, offset_hours(-5));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 10, 8, 0, 0).unwrap());
    }

    #[test]
    fn utc_offset_crossing_midnight_lands_on_the_right_day() {
        // 23:30 UTC on the 10th is 02:30 on the 11th at UTC+3; purge is
        // 03:00 on the 11th local, i.e. 00:00 UTC on the 11th.
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 23, 30, 0).unwrap();
        let next = next_purge_at(now, offset_hours(3));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn purge_hour_translates_to_utc() {
        assert_eq!(purge_hour_utc(offset_hours(0)), 3);
        assert_eq!(purge_hour_utc(offset_hours(2)), 1);
        assert_eq!(purge_hour_utc(offset_hours(-5)), 8);
        assert_eq!(purge_hour_utc(offset_hours(5)), 22);
    }
}
