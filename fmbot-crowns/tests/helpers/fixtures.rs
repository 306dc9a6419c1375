//! Database fixtures

use chrono::{DateTime, Duration, Utc};
use fmbot_common::db::artist_key;
use fmbot_crowns::types::{GuildId, UserId};
use sqlx::SqlitePool;

/// Guild with no thresholds configured
pub async fn insert_guild(pool: &SqlitePool, guild_id: GuildId) {
    sqlx::query("INSERT INTO guilds (guild_id, discord_guild_id, name) VALUES (?, ?, ?)")
        .bind(guild_id)
        .bind(guild_id + 900_000)
        .bind(format!("guild {}", guild_id))
        .execute(pool)
        .await
        .expect("insert guild");
}

pub async fn set_guild_crown_threshold(pool: &SqlitePool, guild_id: GuildId, threshold: i64) {
    sqlx::query("UPDATE guilds SET crowns_min_playcount_threshold = ? WHERE guild_id = ?")
        .bind(threshold)
        .bind(guild_id)
        .execute(pool)
        .await
        .expect("set crown threshold");
}

pub async fn disable_crowns(pool: &SqlitePool, guild_id: GuildId) {
    sqlx::query("UPDATE guilds SET crowns_disabled = 1 WHERE guild_id = ?")
        .bind(guild_id)
        .execute(pool)
        .await
        .expect("disable crowns");
}

pub async fn set_crown_whitelist(pool: &SqlitePool, guild_id: GuildId, role_ids: &[i64]) {
    sqlx::query("UPDATE guilds SET crown_whitelist_role_ids = ? WHERE guild_id = ?")
        .bind(serde_json::to_string(role_ids).expect("role json"))
        .bind(guild_id)
        .execute(pool)
        .await
        .expect("set whitelist");
}

/// Registered user whose Last.fm name is `fm{user_id}`
pub async fn insert_user(pool: &SqlitePool, user_id: UserId, privacy_level: &str) {
    sqlx::query(
        "INSERT INTO users (user_id, discord_user_id, user_name_last_fm, privacy_level) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(user_id + 10_000)
    .bind(lastfm_name(user_id))
    .bind(privacy_level)
    .execute(pool)
    .await
    .expect("insert user");
}

pub fn lastfm_name(user_id: UserId) -> String {
    format!("fm{}", user_id)
}

/// Guild member named `member{user_id}`, seen just now
pub async fn add_member(pool: &SqlitePool, guild_id: GuildId, user_id: UserId) {
    add_member_with(pool, guild_id, user_id, Some(Utc::now()), &[]).await;
}

pub async fn add_member_with(
    pool: &SqlitePool,
    guild_id: GuildId,
    user_id: UserId,
    last_message: Option<DateTime<Utc>>,
    role_ids: &[i64],
) {
    sqlx::query(
        "INSERT INTO guild_users (guild_id, user_id, user_name, last_message, role_ids) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(guild_id)
    .bind(user_id)
    .bind(format!("member{}", user_id))
    .bind(last_message)
    .bind(serde_json::to_string(role_ids).expect("role json"))
    .execute(pool)
    .await
    .expect("add member");
}

/// Member the chat platform no longer resolves (no display name)
pub async fn add_unresolvable_member(pool: &SqlitePool, guild_id: GuildId, user_id: UserId) {
    sqlx::query(
        "INSERT INTO guild_users (guild_id, user_id, user_name, last_message) VALUES (?, ?, NULL, ?)",
    )
    .bind(guild_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .expect("add unresolvable member");
}

/// User + membership in one call
pub async fn add_listener(pool: &SqlitePool, guild_id: GuildId, user_id: UserId) {
    insert_user(pool, user_id, "server").await;
    add_member(pool, guild_id, user_id).await;
}

pub async fn block_user(
    pool: &SqlitePool,
    guild_id: GuildId,
    user_id: UserId,
    from_who_knows: bool,
    from_crowns: bool,
) {
    sqlx::query(
        r#"
        INSERT INTO guild_blocked_users (guild_id, user_id, blocked_from_who_knows, blocked_from_crowns)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(guild_id)
    .bind(user_id)
    .bind(from_who_knows)
    .bind(from_crowns)
    .execute(pool)
    .await
    .expect("block user");
}

/// Replace the user's aggregate count for an artist
pub async fn set_artist_plays(pool: &SqlitePool, user_id: UserId, artist: &str, playcount: i64) {
    sqlx::query("DELETE FROM user_artists WHERE user_id = ? AND name = ?")
        .bind(user_id)
        .bind(artist)
        .execute(pool)
        .await
        .expect("clear artist plays");
    sqlx::query("INSERT INTO user_artists (user_id, name, playcount) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(artist)
        .bind(playcount)
        .execute(pool)
        .await
        .expect("set artist plays");
}

pub async fn set_album_plays(
    pool: &SqlitePool,
    user_id: UserId,
    artist: &str,
    album: &str,
    playcount: i64,
) {
    sqlx::query("INSERT INTO user_albums (user_id, artist_name, name, playcount) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(artist)
        .bind(album)
        .bind(playcount)
        .execute(pool)
        .await
        .expect("set album plays");
}

pub async fn set_track_plays(
    pool: &SqlitePool,
    user_id: UserId,
    artist: &str,
    track: &str,
    playcount: i64,
) {
    sqlx::query("INSERT INTO user_tracks (user_id, artist_name, name, playcount) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(artist)
        .bind(track)
        .bind(playcount)
        .execute(pool)
        .await
        .expect("set track plays");
}

pub async fn set_track_duration(pool: &SqlitePool, artist: &str, track: &str, seconds: i64) {
    sqlx::query("INSERT OR REPLACE INTO tracks (artist_name, name, duration_ms) VALUES (?, ?, ?)")
        .bind(artist)
        .bind(track)
        .bind(seconds * 1000)
        .execute(pool)
        .await
        .expect("set track duration");
}

/// `per_day` plays of one track on each of `days` consecutive days from `start`
pub async fn insert_daily_plays(
    pool: &SqlitePool,
    user_id: UserId,
    artist: &str,
    track: &str,
    start: DateTime<Utc>,
    days: i64,
    per_day: i64,
) {
    let mut tx = pool.begin().await.expect("begin");
    for day in 0..days {
        let day_start = start + Duration::days(day);
        for i in 0..per_day {
            sqlx::query(
                "INSERT INTO user_plays (user_id, artist_name, album_name, track_name, time_played) VALUES (?, ?, NULL, ?, ?)",
            )
            .bind(user_id)
            .bind(artist)
            .bind(track)
            .bind(day_start + Duration::seconds(i * 10))
            .execute(&mut *tx)
            .await
            .expect("insert play");
        }
    }
    tx.commit().await.expect("commit");
}

pub async fn active_crown_count(pool: &SqlitePool, guild_id: GuildId, artist: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM crowns WHERE guild_id = ? AND artist_key = ? AND active = 1")
        .bind(guild_id)
        .bind(artist_key(artist))
        .fetch_one(pool)
        .await
        .expect("count active crowns")
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) {
    fmbot_common::db::set_setting(pool, key, value)
        .await
        .expect("set setting");
}
