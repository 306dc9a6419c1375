//! Database initialization
//!
//! Opens (or creates) the SQLite database, applies connection pragmas, creates
//! every table idempotently and seeds default runtime settings.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets crown evaluations read while a seeding transaction writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Single connection: every `sqlite::memory:` connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes, then default settings (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;

    create_users_table(pool).await?;
    create_guilds_table(pool).await?;
    create_guild_users_table(pool).await?;
    create_guild_blocked_users_table(pool).await?;

    // Play history (populated by the import pipeline)
    create_user_artists_table(pool).await?;
    create_user_albums_table(pool).await?;
    create_user_tracks_table(pool).await?;
    create_user_plays_table(pool).await?;
    create_tracks_table(pool).await?;

    create_crowns_table(pool).await?;
    create_global_filtered_users_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    init_default_settings(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores runtime configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            discord_user_id INTEGER NOT NULL UNIQUE,
            user_name_last_fm TEXT NOT NULL,
            privacy_level TEXT NOT NULL DEFAULT 'server'
                CHECK (privacy_level IN ('server', 'global')),
            last_used TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_guilds_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guilds (
            guild_id INTEGER PRIMARY KEY AUTOINCREMENT,
            discord_guild_id INTEGER NOT NULL UNIQUE,
            name TEXT,
            activity_threshold_days INTEGER CHECK (activity_threshold_days IS NULL OR activity_threshold_days > 0),
            crowns_activity_threshold_days INTEGER CHECK (crowns_activity_threshold_days IS NULL OR crowns_activity_threshold_days > 0),
            crowns_min_playcount_threshold INTEGER CHECK (crowns_min_playcount_threshold IS NULL OR crowns_min_playcount_threshold >= 0),
            crowns_disabled INTEGER NOT NULL DEFAULT 0,
            crown_whitelist_role_ids TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_guild_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guild_users (
            guild_id INTEGER NOT NULL REFERENCES guilds(guild_id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            user_name TEXT,
            last_message TIMESTAMP,
            role_ids TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (guild_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_guild_blocked_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guild_blocked_users (
            guild_id INTEGER NOT NULL REFERENCES guilds(guild_id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            blocked_from_who_knows INTEGER NOT NULL DEFAULT 0,
            blocked_from_crowns INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (guild_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_artists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_artists (
            user_artist_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            name TEXT NOT NULL COLLATE NOCASE,
            playcount INTEGER NOT NULL CHECK (playcount >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_artists_user ON user_artists(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_artists_name ON user_artists(name COLLATE NOCASE)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_user_albums_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_albums (
            user_album_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            artist_name TEXT NOT NULL COLLATE NOCASE,
            name TEXT NOT NULL COLLATE NOCASE,
            playcount INTEGER NOT NULL CHECK (playcount >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_albums_user ON user_albums(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_user_tracks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_tracks (
            user_track_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            artist_name TEXT NOT NULL COLLATE NOCASE,
            name TEXT NOT NULL COLLATE NOCASE,
            playcount INTEGER NOT NULL CHECK (playcount >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_tracks_user ON user_tracks(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_user_plays_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_plays (
            user_play_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            artist_name TEXT NOT NULL,
            album_name TEXT,
            track_name TEXT NOT NULL,
            time_played TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_plays_user_time ON user_plays(user_id, time_played)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_plays_time ON user_plays(time_played)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Track metadata cache (durations used by the abuse filter)
async fn create_tracks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            artist_name TEXT NOT NULL COLLATE NOCASE,
            name TEXT NOT NULL COLLATE NOCASE,
            duration_ms INTEGER CHECK (duration_ms IS NULL OR duration_ms > 0),
            PRIMARY KEY (artist_name, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the crowns table
///
/// The partial unique index is the storage-level guarantee that a guild has
/// at most one active crown per artist. `artist_key` holds [`artist_key`]
/// of the display name so the index folds case the same way lookups do.
///
/// [`artist_key`]: crate::db::artist_key
pub async fn create_crowns_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crowns (
            crown_id INTEGER PRIMARY KEY AUTOINCREMENT,
            guild_id INTEGER NOT NULL REFERENCES guilds(guild_id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            artist_name TEXT NOT NULL,
            artist_key TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL,
            modified_at TIMESTAMP NOT NULL,
            start_play_count INTEGER NOT NULL CHECK (start_play_count >= 0),
            current_play_count INTEGER NOT NULL CHECK (current_play_count >= 0),
            is_seeded INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_crowns_active_artist
        ON crowns(guild_id, artist_key)
        WHERE active = 1
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_crowns_guild_user ON crowns(guild_id, user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_global_filtered_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS global_filtered_users (
            global_filtered_user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL UNIQUE REFERENCES users(user_id) ON DELETE CASCADE,
            reason TEXT NOT NULL
                CHECK (reason IN ('excess-playtime', 'excess-play-rate', 'short-track-abuse')),
            window_start TIMESTAMP NOT NULL,
            window_end TIMESTAMP NOT NULL,
            play_count INTEGER NOT NULL DEFAULT 0,
            listening_seconds INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or repair default runtime settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Crowns
    ensure_setting(pool, "crown_default_min_playcount", "30").await?;
    ensure_setting(pool, "crown_theft_disabled", "false").await?;

    // WhoKnows leaderboards
    ensure_setting(pool, "whoknows_cache_ttl_seconds", "1500").await?; // 25 minutes
    ensure_setting(pool, "whoknows_list_limit", "14").await?;

    // Global abuse filter
    ensure_setting(pool, "abuse_lookback_days", "11").await?;
    ensure_setting(pool, "abuse_exclude_recent_days", "3").await?;
    ensure_setting(pool, "abuse_max_hours", "144").await?;
    ensure_setting(pool, "abuse_max_plays_per_day", "600").await?;
    ensure_setting(pool, "abuse_scan_interval_secs", "86400").await?;
    ensure_setting(pool, "global_filter_retention_days", "90").await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// Missing settings are created; NULL values are reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE: concurrent initializers may race here
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read a raw setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.flatten())
}

/// Write a setting value (insert or replace)
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}
