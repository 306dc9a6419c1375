//! Global abuse filter
//!
//! Periodically scans recent play history for listening volumes no person
//! produces by hand. Flagged users are hidden from global leaderboards only;
//! guild leaderboards and crowns ignore the flag.

use crate::config::AbuseFilterConfig;
use crate::db::filtered_users::upsert_filtered_user;
use crate::types::{AbuseFilterRecord, AbuseReason, Play, PlayHistoryStore, UserId};
use chrono::{DateTime, Utc};
use fmbot_common::time::days_before;
use fmbot_common::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Assumed length of a track without a known duration
pub const FALLBACK_TRACK_SECONDS: i64 = 210;

/// Tracks shorter than this count towards short-track abuse
pub const SHORT_TRACK_SECONDS: i64 = 40;

/// Minimum number of short plays before the short-track rule applies
pub const SHORT_TRACK_MIN_PLAYS: i64 = 1000;

/// Aggregated listening in one analysis window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListeningStats {
    pub play_count: i64,
    pub listening_seconds: i64,
    pub short_track_plays: i64,
}

impl ListeningStats {
    fn add_play(&mut self, duration_seconds: i64) {
        self.play_count += 1;
        self.listening_seconds += duration_seconds;
        if duration_seconds < SHORT_TRACK_SECONDS {
            self.short_track_plays += 1;
        }
    }
}

/// Reason to flag, checked in priority order
pub fn classify(
    stats: &ListeningStats,
    window_days: i64,
    config: &AbuseFilterConfig,
) -> Option<AbuseReason> {
    if stats.play_count == 0 || window_days <= 0 {
        return None;
    }

    if stats.listening_seconds >= config.max_listening_hours * 3600 {
        return Some(AbuseReason::ExcessPlaytime);
    }

    let plays_per_day = stats.play_count as f64 / window_days as f64;
    if plays_per_day >= config.max_plays_per_day {
        return Some(AbuseReason::ExcessPlayRate);
    }

    if stats.short_track_plays >= SHORT_TRACK_MIN_PLAYS
        && stats.short_track_plays * 2 >= stats.play_count
    {
        return Some(AbuseReason::ShortTrackAbuse);
    }

    None
}

pub struct AbuseFilter {
    pool: SqlitePool,
    store: Arc<dyn PlayHistoryStore>,
    config: AbuseFilterConfig,
}

impl AbuseFilter {
    pub fn new(pool: SqlitePool, store: Arc<dyn PlayHistoryStore>, config: AbuseFilterConfig) -> Self {
        Self { pool, store, config }
    }

    /// Run one scan ending at the current time
    pub async fn scan(&self) -> Result<Vec<AbuseFilterRecord>> {
        self.scan_at(Utc::now()).await
    }

    /// Run one scan with the window anchored at `now`
    ///
    /// Every flagged user is upserted; users whose history cannot be read are
    /// skipped for this run.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<Vec<AbuseFilterRecord>> {
        let window_start = days_before(now, self.config.lookback_days);
        let window_end = days_before(now, self.config.exclude_recent_days);
        let window_days = self.config.window_days();

        let users = self
            .store
            .users_with_plays_in_window(window_start, window_end)
            .await?;
        info!(users = users.len(), %window_start, %window_end, "Starting abuse filter scan");

        let mut durations: HashMap<(String, String), i64> = HashMap::new();
        let mut flagged = Vec::new();

        for user_id in users {
            let stats = match self
                .user_stats(user_id, window_start, window_end, &mut durations)
                .await
            {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(user_id, error = %e, "Skipping user in abuse scan");
                    continue;
                }
            };

            let Some(reason) = classify(&stats, window_days, &self.config) else {
                continue;
            };

            let record = AbuseFilterRecord {
                user_id,
                reason,
                window_start,
                window_end,
                play_count: stats.play_count,
                listening_seconds: stats.listening_seconds,
            };
            upsert_filtered_user(&self.pool, &record, now).await?;
            info!(
                user_id,
                reason = reason.as_db(),
                play_count = stats.play_count,
                listening_hours = stats.listening_seconds / 3600,
                "User flagged by abuse filter"
            );
            flagged.push(record);
        }

        info!(flagged = flagged.len(), "Abuse filter scan complete");
        Ok(flagged)
    }

    async fn user_stats(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        durations: &mut HashMap<(String, String), i64>,
    ) -> Result<ListeningStats> {
        let plays = self.store.get_plays_in_window(user_id, start, end).await?;
        let mut stats = ListeningStats::default();

        for play in &plays {
            let seconds = self.duration_of(play, durations).await?;
            stats.add_play(seconds);
        }

        debug!(user_id, plays = stats.play_count, "Collected listening stats");
        Ok(stats)
    }

    async fn duration_of(
        &self,
        play: &Play,
        durations: &mut HashMap<(String, String), i64>,
    ) -> Result<i64> {
        let key = (
            play.artist_name.to_lowercase(),
            play.track_name.to_lowercase(),
        );
        if let Some(seconds) = durations.get(&key) {
            return Ok(*seconds);
        }

        let seconds = self
            .store
            .get_track_duration(&play.artist_name, &play.track_name)
            .await?
            .filter(|s| *s > 0)
            .unwrap_or(FALLBACK_TRACK_SECONDS);
        durations.insert(key, seconds);
        Ok(seconds)
    }

    /// Scan on `scan_interval` until `shutdown` fires
    pub fn spawn_periodic(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.scan_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Abuse filter loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.scan().await {
                            error!(error = %e, "Abuse filter scan failed");
                        }
                    }
                }
            }
        })
    }
}
