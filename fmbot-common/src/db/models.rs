//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Registered bot user (one Last.fm identity per chat-platform account)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: i64,
    pub discord_user_id: i64,
    pub user_name_last_fm: String,
    pub privacy_level: String,
    pub last_used: Option<DateTime<Utc>>,
}

/// Guild settings row as stored
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GuildRow {
    pub guild_id: i64,
    pub discord_guild_id: i64,
    pub name: Option<String>,
    pub activity_threshold_days: Option<i64>,
    pub crowns_activity_threshold_days: Option<i64>,
    pub crowns_min_playcount_threshold: Option<i64>,
    pub crowns_disabled: bool,
    /// JSON array of role ids
    pub crown_whitelist_role_ids: String,
}

/// One roster entry: guild membership joined with the user row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GuildMemberRow {
    pub user_id: i64,
    pub discord_user_id: i64,
    pub user_name_last_fm: String,
    pub privacy_level: String,
    pub user_name: Option<String>,
    pub last_message: Option<DateTime<Utc>>,
    /// JSON array of role ids
    pub role_ids: String,
}

/// Case-folded artist name stored in `crowns.artist_key`
///
/// Full Unicode lowercasing; SQLite's NOCASE only folds ASCII.
pub fn artist_key(artist_name: &str) -> String {
    artist_name.trim().to_lowercase()
}

/// Crown ownership record
///
/// At most one row per (guild_id, artist_key) has `active = true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CrownRecord {
    pub crown_id: i64,
    pub guild_id: i64,
    pub user_id: i64,
    pub artist_name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub start_play_count: i64,
    pub current_play_count: i64,
    pub is_seeded: bool,
    /// Bumped on every write; compare-and-swap token
    pub version: i64,
}

/// Persisted global abuse filter flag
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GlobalFilteredUserRow {
    pub user_id: i64,
    pub reason: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub play_count: i64,
    pub listening_seconds: i64,
}
