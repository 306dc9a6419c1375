//! Crown ledger persistence
//!
//! Every mutation of an active crown is a conditional write keyed on
//! `(crown_id, version)`. Combined with the partial unique index on active
//! `(guild_id, artist_key)` rows this gives at most one winner when two
//! evaluations race on the same guild/artist: the loser's write matches no
//! row (or violates the index) and is reported as [`WriteOutcome::Conflict`].

use crate::types::{GuildId, UserId};
use chrono::{DateTime, Utc};
use fmbot_common::db::{artist_key, CrownRecord};
use fmbot_common::{Error, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

const CROWN_COLUMNS: &str = "crown_id, guild_id, user_id, artist_name, active, created_at, \
     modified_at, start_play_count, current_play_count, is_seeded, version";

/// Result of a conditional ledger write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    Applied(T),
    /// Another writer changed the record first; nothing was written
    Conflict,
}

/// Both sides of a successful theft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StolenCrown {
    pub previous: CrownRecord,
    pub current: CrownRecord,
}

/// Crown row to (re)insert during seeding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedCrown {
    /// Reused from the prior seeded row for the same (artist, user)
    pub crown_id: Option<i64>,
    /// Past the prior row's version when `crown_id` is reused, so snapshots
    /// taken before the reseed fail their compare-and-swap
    pub version: i64,
    pub user_id: UserId,
    pub artist_name: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub start_play_count: i64,
    pub current_play_count: i64,
}

/// Current active crown for an artist (matched on [`artist_key`])
pub async fn get_active_crown(
    pool: &SqlitePool,
    guild_id: GuildId,
    artist_name: &str,
) -> Result<Option<CrownRecord>> {
    let sql = format!(
        "SELECT {} FROM crowns WHERE guild_id = ? AND artist_key = ? AND active = 1",
        CROWN_COLUMNS
    );
    let crown = sqlx::query_as::<_, CrownRecord>(&sql)
        .bind(guild_id)
        .bind(artist_key(artist_name))
        .fetch_optional(pool)
        .await?;

    Ok(crown)
}

pub async fn get_crown(pool: &SqlitePool, crown_id: i64) -> Result<Option<CrownRecord>> {
    let sql = format!("SELECT {} FROM crowns WHERE crown_id = ?", CROWN_COLUMNS);
    let crown = sqlx::query_as::<_, CrownRecord>(&sql)
        .bind(crown_id)
        .fetch_optional(pool)
        .await?;

    Ok(crown)
}

/// Create the first active crown for an artist
///
/// Conflicts when another evaluation claimed the artist first.
pub async fn claim_crown(
    pool: &SqlitePool,
    guild_id: GuildId,
    user_id: UserId,
    artist_name: &str,
    play_count: i64,
    now: DateTime<Utc>,
) -> Result<WriteOutcome<CrownRecord>> {
    let mut tx = pool.begin().await?;

    match insert_active_crown(&mut tx, guild_id, user_id, artist_name, play_count, now).await? {
        Some(crown_id) => {
            tx.commit().await?;
            let crown = fetch_required(pool, crown_id).await?;
            info!(guild_id, user_id, artist = %crown.artist_name, play_count, "Crown claimed");
            Ok(WriteOutcome::Applied(crown))
        }
        None => {
            tx.rollback().await?;
            debug!(guild_id, artist = artist_name, "Claim lost to a concurrent writer");
            Ok(WriteOutcome::Conflict)
        }
    }
}

/// Raise the play count of the crown `expected` describes
///
/// `clear_seeded` turns a seeded crown into an organic one.
pub async fn refresh_crown(
    pool: &SqlitePool,
    expected: &CrownRecord,
    play_count: i64,
    clear_seeded: bool,
    now: DateTime<Utc>,
) -> Result<WriteOutcome<CrownRecord>> {
    let updated = sqlx::query(
        r#"
        UPDATE crowns
        SET current_play_count = ?,
            modified_at = ?,
            is_seeded = CASE WHEN ? THEN 0 ELSE is_seeded END,
            version = version + 1
        WHERE crown_id = ? AND active = 1 AND version = ?
        "#,
    )
    .bind(play_count)
    .bind(now)
    .bind(clear_seeded)
    .bind(expected.crown_id)
    .bind(expected.version)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        debug!(crown_id = expected.crown_id, "Refresh lost to a concurrent writer");
        return Ok(WriteOutcome::Conflict);
    }

    Ok(WriteOutcome::Applied(fetch_required(pool, expected.crown_id).await?))
}

/// Deactivate `expected` and hand the artist to `new_owner` atomically
///
/// The old record keeps `final_play_count` as its last known count.
pub async fn steal_crown(
    pool: &SqlitePool,
    expected: &CrownRecord,
    final_play_count: i64,
    new_owner: UserId,
    new_play_count: i64,
    now: DateTime<Utc>,
) -> Result<WriteOutcome<StolenCrown>> {
    let mut tx = pool.begin().await?;

    let deactivated = sqlx::query(
        r#"
        UPDATE crowns
        SET active = 0,
            current_play_count = ?,
            modified_at = ?,
            version = version + 1
        WHERE crown_id = ? AND active = 1 AND version = ?
        "#,
    )
    .bind(final_play_count)
    .bind(now)
    .bind(expected.crown_id)
    .bind(expected.version)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if deactivated == 0 {
        tx.rollback().await?;
        debug!(crown_id = expected.crown_id, "Theft lost to a concurrent writer");
        return Ok(WriteOutcome::Conflict);
    }

    let new_crown_id = match insert_active_crown(
        &mut tx,
        expected.guild_id,
        new_owner,
        &expected.artist_name,
        new_play_count,
        now,
    )
    .await?
    {
        Some(id) => id,
        None => {
            tx.rollback().await?;
            return Ok(WriteOutcome::Conflict);
        }
    };

    tx.commit().await?;

    let previous = fetch_required(pool, expected.crown_id).await?;
    let current = fetch_required(pool, new_crown_id).await?;

    info!(
        guild_id = expected.guild_id,
        artist = %expected.artist_name,
        from_user = expected.user_id,
        to_user = new_owner,
        new_play_count,
        "Crown stolen"
    );

    Ok(WriteOutcome::Applied(StolenCrown { previous, current }))
}

/// Insert an active crown; `None` when the unique active index rejects it
async fn insert_active_crown(
    tx: &mut Transaction<'_, Sqlite>,
    guild_id: GuildId,
    user_id: UserId,
    artist_name: &str,
    play_count: i64,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO crowns (guild_id, user_id, artist_name, artist_key, active, created_at,
                            modified_at, start_play_count, current_play_count, is_seeded,
                            version)
        VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?, 0, 0)
        "#,
    )
    .bind(guild_id)
    .bind(user_id)
    .bind(artist_name.trim())
    .bind(artist_key(artist_name))
    .bind(now)
    .bind(now)
    .bind(play_count)
    .bind(play_count)
    .execute(&mut **tx)
    .await;

    match inserted {
        Ok(result) => Ok(Some(result.last_insert_rowid())),
        Err(e) => {
            let err = Error::from(e);
            if err.is_unique_violation() {
                Ok(None)
            } else {
                Err(err)
            }
        }
    }
}

async fn fetch_required(pool: &SqlitePool, crown_id: i64) -> Result<CrownRecord> {
    get_crown(pool, crown_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("crown {} vanished after write", crown_id)))
}

/// Active crowns in a guild, highest play count first
pub async fn list_crowns_for_guild(pool: &SqlitePool, guild_id: GuildId) -> Result<Vec<CrownRecord>> {
    let sql = format!(
        "SELECT {} FROM crowns WHERE guild_id = ? AND active = 1 \
         ORDER BY current_play_count DESC, artist_name",
        CROWN_COLUMNS
    );
    let crowns = sqlx::query_as::<_, CrownRecord>(&sql)
        .bind(guild_id)
        .fetch_all(pool)
        .await?;

    Ok(crowns)
}

/// Active crowns a user holds in a guild, highest play count first
pub async fn list_crowns_for_user(
    pool: &SqlitePool,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<Vec<CrownRecord>> {
    let sql = format!(
        "SELECT {} FROM crowns WHERE guild_id = ? AND user_id = ? AND active = 1 \
         ORDER BY current_play_count DESC, artist_name",
        CROWN_COLUMNS
    );
    let crowns = sqlx::query_as::<_, CrownRecord>(&sql)
        .bind(guild_id)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(crowns)
}

/// Every crown (active and past) for an artist in a guild, newest first
pub async fn list_crown_history(
    pool: &SqlitePool,
    guild_id: GuildId,
    artist_name: &str,
) -> Result<Vec<CrownRecord>> {
    let sql = format!(
        "SELECT {} FROM crowns WHERE guild_id = ? AND artist_key = ? \
         ORDER BY created_at DESC, crown_id DESC",
        CROWN_COLUMNS
    );
    let crowns = sqlx::query_as::<_, CrownRecord>(&sql)
        .bind(guild_id)
        .bind(artist_key(artist_name))
        .fetch_all(pool)
        .await?;

    Ok(crowns)
}

/// Users ranked by number of active crowns in a guild
pub async fn top_crown_holders(
    pool: &SqlitePool,
    guild_id: GuildId,
    limit: usize,
) -> Result<Vec<(UserId, i64)>> {
    let holders = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT user_id, COUNT(*) AS crown_count
        FROM crowns
        WHERE guild_id = ? AND active = 1
        GROUP BY user_id
        ORDER BY crown_count DESC, user_id
        LIMIT ?
        "#,
    )
    .bind(guild_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(holders)
}

/// Guild reset: delete every crown (active and history)
pub async fn remove_all_crowns_for_guild(pool: &SqlitePool, guild_id: GuildId) -> Result<u64> {
    let removed = sqlx::query("DELETE FROM crowns WHERE guild_id = ?")
        .bind(guild_id)
        .execute(pool)
        .await?
        .rows_affected();

    info!(guild_id, removed, "Removed all crowns for guild");
    Ok(removed)
}

/// User deletion: delete the user's crowns in every guild
pub async fn remove_all_crowns_for_user(pool: &SqlitePool, user_id: UserId) -> Result<u64> {
    let removed = sqlx::query("DELETE FROM crowns WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();

    info!(user_id, removed, "Removed all crowns for user");
    Ok(removed)
}

/// Member departure: delete the user's crowns in one guild
pub async fn remove_member_crowns(
    pool: &SqlitePool,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<u64> {
    let removed = sqlx::query("DELETE FROM crowns WHERE guild_id = ? AND user_id = ?")
        .bind(guild_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();

    info!(guild_id, user_id, removed, "Removed crowns for departed member");
    Ok(removed)
}

pub async fn remove_seeded_crowns(pool: &SqlitePool, guild_id: GuildId) -> Result<u64> {
    let removed = sqlx::query("DELETE FROM crowns WHERE guild_id = ? AND is_seeded = 1")
        .bind(guild_id)
        .execute(pool)
        .await?
        .rows_affected();

    info!(guild_id, removed, "Removed seeded crowns");
    Ok(removed)
}

/// Replace all seeded crowns of a guild in one transaction
///
/// Rows colliding with an active crown (an organic claim that landed after
/// the seeder read the ledger) are skipped. Returns the number inserted.
pub async fn replace_seeded_crowns(
    pool: &SqlitePool,
    guild_id: GuildId,
    seeds: &[SeedCrown],
) -> Result<usize> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM crowns WHERE guild_id = ? AND is_seeded = 1")
        .bind(guild_id)
        .execute(&mut *tx)
        .await?;

    let mut written = 0usize;
    for seed in seeds {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO crowns (crown_id, guild_id, user_id, artist_name, artist_key,
                                          active, created_at, modified_at, start_play_count,
                                          current_play_count, is_seeded, version)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(seed.crown_id)
        .bind(guild_id)
        .bind(seed.user_id)
        .bind(seed.artist_name.trim())
        .bind(artist_key(&seed.artist_name))
        .bind(seed.created_at)
        .bind(seed.modified_at)
        .bind(seed.start_play_count)
        .bind(seed.current_play_count)
        .bind(seed.version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        written += inserted as usize;
    }

    tx.commit().await?;
    Ok(written)
}
