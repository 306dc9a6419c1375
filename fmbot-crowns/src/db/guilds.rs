//! Guild policy and roster queries

use crate::types::{GuildId, GuildMember, GuildPolicy, PrivacyLevel, UserId};
use fmbot_common::db::{GuildMemberRow, GuildRow, UserRow};
use fmbot_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::warn;

/// Load a guild's leaderboard/crown policy including both block-lists
pub async fn load_guild_policy(pool: &SqlitePool, guild_id: GuildId) -> Result<GuildPolicy> {
    let row = sqlx::query_as::<_, GuildRow>(
        r#"
        SELECT guild_id, discord_guild_id, name, activity_threshold_days,
               crowns_activity_threshold_days, crowns_min_playcount_threshold,
               crowns_disabled, crown_whitelist_role_ids
        FROM guilds
        WHERE guild_id = ?
        "#,
    )
    .bind(guild_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("guild {}", guild_id)))?;

    let blocked = sqlx::query_as::<_, (i64, bool, bool)>(
        r#"
        SELECT user_id, blocked_from_who_knows, blocked_from_crowns
        FROM guild_blocked_users
        WHERE guild_id = ?
        "#,
    )
    .bind(guild_id)
    .fetch_all(pool)
    .await?;

    let mut who_knows_blocked_user_ids = HashSet::new();
    let mut crown_blocked_user_ids = HashSet::new();
    for (user_id, from_who_knows, from_crowns) in blocked {
        if from_who_knows {
            who_knows_blocked_user_ids.insert(user_id);
        }
        if from_crowns {
            crown_blocked_user_ids.insert(user_id);
        }
    }

    Ok(GuildPolicy {
        guild_id: row.guild_id,
        activity_threshold_days: row.activity_threshold_days,
        crown_activity_threshold_days: row.crowns_activity_threshold_days,
        crown_min_play_count_threshold: row.crowns_min_playcount_threshold,
        crowns_disabled: row.crowns_disabled,
        who_knows_blocked_user_ids,
        crown_blocked_user_ids,
        crown_whitelist_role_ids: parse_role_ids(&row.crown_whitelist_role_ids),
    })
}

/// Load the guild roster
pub async fn load_guild_members(pool: &SqlitePool, guild_id: GuildId) -> Result<Vec<GuildMember>> {
    let rows = sqlx::query_as::<_, GuildMemberRow>(
        r#"
        SELECT u.user_id, u.discord_user_id, u.user_name_last_fm, u.privacy_level,
               gu.user_name, gu.last_message, gu.role_ids
        FROM guild_users gu
        JOIN users u ON u.user_id = gu.user_id
        WHERE gu.guild_id = ?
        ORDER BY u.user_id
        "#,
    )
    .bind(guild_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| GuildMember {
            user_id: row.user_id,
            discord_user_id: row.discord_user_id,
            lastfm_user_name: row.user_name_last_fm,
            display_name: row.user_name,
            last_message: row.last_message,
            role_ids: parse_role_ids(&row.role_ids),
            privacy_level: PrivacyLevel::from_db(&row.privacy_level),
        })
        .collect())
}

pub async fn get_user(pool: &SqlitePool, user_id: UserId) -> Result<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT user_id, discord_user_id, user_name_last_fm, privacy_level, last_used
        FROM users
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

fn parse_role_ids(raw: &str) -> Vec<i64> {
    match serde_json::from_str::<Vec<i64>>(raw) {
        Ok(ids) => ids,
        Err(e) => {
            warn!(raw, error = %e, "Ignoring malformed role id list");
            Vec::new()
        }
    }
}
