//! Global abuse filter flags

use crate::types::{AbuseFilterRecord, AbuseReason, UserId};
use chrono::{DateTime, Utc};
use fmbot_common::db::GlobalFilteredUserRow;
use fmbot_common::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::warn;

/// Insert or replace the flag for a user
///
/// A user carries at most one flag; a newer scan overwrites the older one.
pub async fn upsert_filtered_user(
    pool: &SqlitePool,
    record: &AbuseFilterRecord,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO global_filtered_users (user_id, reason, window_start, window_end,
                                           play_count, listening_seconds, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            reason = excluded.reason,
            window_start = excluded.window_start,
            window_end = excluded.window_end,
            play_count = excluded.play_count,
            listening_seconds = excluded.listening_seconds,
            created_at = excluded.created_at
        "#,
    )
    .bind(record.user_id)
    .bind(record.reason.as_db())
    .bind(record.window_start)
    .bind(record.window_end)
    .bind(record.play_count)
    .bind(record.listening_seconds)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Users flagged at or after `since`
pub async fn active_filtered_user_ids(
    pool: &SqlitePool,
    since: DateTime<Utc>,
) -> Result<HashSet<UserId>> {
    let ids: Vec<i64> =
        sqlx::query_scalar("SELECT user_id FROM global_filtered_users WHERE created_at >= ?")
            .bind(since)
            .fetch_all(pool)
            .await?;

    Ok(ids.into_iter().collect())
}

/// All stored flags, most recent first
pub async fn list_filtered_users(pool: &SqlitePool) -> Result<Vec<AbuseFilterRecord>> {
    let rows = sqlx::query_as::<_, GlobalFilteredUserRow>(
        r#"
        SELECT user_id, reason, window_start, window_end, play_count, listening_seconds
        FROM global_filtered_users
        ORDER BY created_at DESC, user_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match AbuseReason::from_db(&row.reason) {
            Some(reason) => Some(AbuseFilterRecord {
                user_id: row.user_id,
                reason,
                window_start: row.window_start,
                window_end: row.window_end,
                play_count: row.play_count,
                listening_seconds: row.listening_seconds,
            }),
            None => {
                warn!(user_id = row.user_id, reason = %row.reason, "Skipping unknown filter reason");
                None
            }
        })
        .collect())
}
