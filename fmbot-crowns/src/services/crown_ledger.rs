//! Crown ledger
//!
//! Decides who holds the crown for a (guild, artist) pair and records the
//! change. Leaderboard counts come from the per-user cache and may lag, so a
//! contested crown is re-verified against the provider before it moves.
//!
//! Verification happens before any write and holds no lock; the write itself
//! is a conditional update on the crown's version, so of two racing
//! evaluations at most one changes the ledger. The loser reports
//! [`NoChangeReason::WriteConflict`] and is not retried.

use crate::config::CrownSettings;
use crate::db::crowns::{self, StolenCrown, WriteOutcome};
use crate::db::guilds::get_user;
use crate::services::leaderboard::LeaderboardBuilder;
use crate::types::{
    ArtistPlayCountVerifier, GuildId, GuildPolicy, LeaderboardEntry, PlayHistoryStore, UserId,
};
use chrono::Utc;
use fmbot_common::db::CrownRecord;
use fmbot_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why an evaluation left the ledger untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoChangeReason {
    /// Holder is the top listener and the stored count is current
    UpToDate,
    /// Challenger is above the holder but below the claim floor
    BelowFloor,
    /// Theft is switched off globally
    TheftDisabled,
    /// The provider could not confirm the holder's play count
    VerificationUnavailable,
    /// Another evaluation changed the crown first
    WriteConflict,
}

/// Why nobody can take the crown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    CrownsDisabled,
    /// Top listener is close to the floor but not there yet
    BelowThreshold {
        user_id: UserId,
        play_count: i64,
        threshold: i64,
        needed: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CrownEvaluation {
    NoChange {
        reason: NoChangeReason,
        crown: Option<CrownRecord>,
    },
    Refreshed {
        crown: CrownRecord,
    },
    Claimed {
        crown: CrownRecord,
    },
    Stolen {
        previous: CrownRecord,
        current: CrownRecord,
    },
    Ineligible {
        reason: IneligibleReason,
    },
}

/// Evaluation result handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrownOutcome {
    pub evaluation: CrownEvaluation,
    pub message: String,
    pub stolen: bool,
}

impl CrownOutcome {
    fn new(evaluation: CrownEvaluation, message: String) -> Self {
        let stolen = matches!(evaluation, CrownEvaluation::Stolen { .. });
        Self {
            evaluation,
            message,
            stolen,
        }
    }
}

/// Claim floor: the guild threshold, never below the global default
pub fn claim_floor(policy: &GuildPolicy, settings: &CrownSettings) -> i64 {
    policy
        .crown_min_play_count_threshold
        .unwrap_or(0)
        .max(settings.default_min_playcount)
}

pub struct CrownLedger {
    pool: SqlitePool,
    store: Arc<dyn PlayHistoryStore>,
    verifier: Arc<dyn ArtistPlayCountVerifier>,
    leaderboards: Arc<LeaderboardBuilder>,
}

impl CrownLedger {
    pub fn new(
        pool: SqlitePool,
        store: Arc<dyn PlayHistoryStore>,
        verifier: Arc<dyn ArtistPlayCountVerifier>,
        leaderboards: Arc<LeaderboardBuilder>,
    ) -> Self {
        Self {
            pool,
            store,
            verifier,
            leaderboards,
        }
    }

    /// Evaluate the crown for `artist` given the crown-eligible ranking
    ///
    /// `eligible` must already be filtered to members allowed to hold crowns.
    /// Returns `None` when there is nothing worth reporting (no crown and no
    /// listener anywhere near the floor).
    pub async fn evaluate(
        &self,
        policy: &GuildPolicy,
        artist: &str,
        eligible: &[LeaderboardEntry],
    ) -> Result<Option<CrownOutcome>> {
        let guild_id = policy.guild_id;

        if policy.crowns_disabled {
            return Ok(Some(CrownOutcome::new(
                CrownEvaluation::Ineligible {
                    reason: IneligibleReason::CrownsDisabled,
                },
                "Crowns are disabled in this server.".to_string(),
            )));
        }

        let settings = CrownSettings::from_database(&self.pool).await?;
        let floor = claim_floor(policy, &settings);
        let current = crowns::get_active_crown(&self.pool, guild_id, artist).await?;

        let Some(top) = top_candidate(eligible, current.as_ref().map(|c| c.user_id)) else {
            return Ok(None);
        };
        let Some(top_user) = top.user_id else {
            return Ok(None);
        };

        let Some(current) = current else {
            return self.evaluate_unclaimed(guild_id, artist, top, top_user, floor).await;
        };

        if current.user_id == top_user {
            return self.refresh_owner(&current, artist, top).await.map(Some);
        }

        self.contest(&current, artist, eligible, top, top_user, floor, &settings)
            .await
            .map(Some)
    }

    async fn evaluate_unclaimed(
        &self,
        guild_id: GuildId,
        artist: &str,
        top: &LeaderboardEntry,
        top_user: UserId,
        floor: i64,
    ) -> Result<Option<CrownOutcome>> {
        if top.play_count >= floor {
            let outcome = crowns::claim_crown(
                &self.pool,
                guild_id,
                top_user,
                artist,
                top.play_count,
                Utc::now(),
            )
            .await?;

            return Ok(Some(match outcome {
                WriteOutcome::Applied(crown) => {
                    let message = format!(
                        "{} claimed the crown for {} with {} plays!",
                        top.display_name, crown.artist_name, crown.current_play_count
                    );
                    CrownOutcome::new(CrownEvaluation::Claimed { crown }, message)
                }
                WriteOutcome::Conflict => conflict_outcome(artist, None),
            }));
        }

        if top.play_count >= floor / 3 {
            let needed = floor - top.play_count;
            debug!(guild_id, artist, play_count = top.play_count, floor, "Top listener below crown floor");
            return Ok(Some(CrownOutcome::new(
                CrownEvaluation::Ineligible {
                    reason: IneligibleReason::BelowThreshold {
                        user_id: top_user,
                        play_count: top.play_count,
                        threshold: floor,
                        needed,
                    },
                },
                format!(
                    "{} needs {} more {} to claim the crown for {} (at least {}).",
                    top.display_name,
                    needed,
                    plural(needed, "play", "plays"),
                    artist,
                    floor
                ),
            )));
        }

        Ok(None)
    }

    /// Holder is still on top; bring the stored count up to date
    async fn refresh_owner(
        &self,
        current: &CrownRecord,
        artist: &str,
        top: &LeaderboardEntry,
    ) -> Result<CrownOutcome> {
        if top.play_count <= current.current_play_count {
            return Ok(CrownOutcome::new(
                CrownEvaluation::NoChange {
                    reason: NoChangeReason::UpToDate,
                    crown: Some(current.clone()),
                },
                format!(
                    "{} holds the crown for {} with {} plays.",
                    top.display_name, current.artist_name, current.current_play_count
                ),
            ));
        }

        // A seeded crown the holder keeps on their own counts becomes organic
        match crowns::refresh_crown(&self.pool, current, top.play_count, true, Utc::now()).await? {
            WriteOutcome::Applied(crown) => {
                let message = format!(
                    "{} holds the crown for {} with {} plays.",
                    top.display_name, crown.artist_name, crown.current_play_count
                );
                Ok(CrownOutcome::new(CrownEvaluation::Refreshed { crown }, message))
            }
            WriteOutcome::Conflict => Ok(conflict_outcome(artist, Some(current.clone()))),
        }
    }

    /// Someone else leads the ranking: verify the holder, then keep or move the crown
    #[allow(clippy::too_many_arguments)]
    async fn contest(
        &self,
        current: &CrownRecord,
        artist: &str,
        eligible: &[LeaderboardEntry],
        top: &LeaderboardEntry,
        top_user: UserId,
        floor: i64,
        settings: &CrownSettings,
    ) -> Result<CrownOutcome> {
        let guild_id = current.guild_id;

        if settings.theft_disabled {
            return Ok(CrownOutcome::new(
                CrownEvaluation::NoChange {
                    reason: NoChangeReason::TheftDisabled,
                    crown: Some(current.clone()),
                },
                "Crown stealing is temporarily disabled while play counts can't be verified."
                    .to_string(),
            ));
        }

        if top.play_count < floor {
            return Ok(CrownOutcome::new(
                CrownEvaluation::NoChange {
                    reason: NoChangeReason::BelowFloor,
                    crown: Some(current.clone()),
                },
                format!(
                    "{} needs at least {} plays to take the crown for {}.",
                    top.display_name, floor, current.artist_name
                ),
            ));
        }

        let holder_entry = eligible.iter().find(|e| e.user_id == Some(current.user_id));
        let holder_eligible = holder_entry.is_some();

        let (holder_name, holder_lastfm) = match holder_entry {
            Some(entry) => (
                entry.display_name.clone(),
                entry.lastfm_user_name.clone(),
            ),
            None => match get_user(&self.pool, current.user_id).await? {
                Some(user) => (user.user_name_last_fm.clone(), Some(user.user_name_last_fm)),
                None => ("The previous holder".to_string(), None),
            },
        };

        self.spawn_holder_refresh(current.user_id);

        let verified = match holder_lastfm {
            Some(lastfm) => match self
                .verifier
                .get_authoritative_artist_play_count(&current.artist_name, &lastfm)
                .await
            {
                Ok(count) => count,
                Err(e) => {
                    warn!(guild_id, artist, holder = current.user_id, error = %e, "Crown verification failed");
                    None
                }
            },
            None => None,
        };

        let Some(verified) = verified else {
            warn!(guild_id, artist, holder = current.user_id, "Crown holder play count unavailable");
            return Ok(CrownOutcome::new(
                CrownEvaluation::NoChange {
                    reason: NoChangeReason::VerificationUnavailable,
                    crown: Some(current.clone()),
                },
                format!(
                    "Couldn't verify {}'s plays right now, so the crown for {} stays put.",
                    holder_name, current.artist_name
                ),
            ));
        };

        let now = Utc::now();

        if verified >= top.play_count && holder_eligible {
            let new_count = verified.max(current.start_play_count);
            return match crowns::refresh_crown(&self.pool, current, new_count, false, now).await? {
                WriteOutcome::Applied(crown) => {
                    info!(guild_id, artist, holder = crown.user_id, verified, "Crown defended");
                    let message = format!(
                        "{} keeps the crown for {} with {} plays.",
                        holder_name, crown.artist_name, crown.current_play_count
                    );
                    Ok(CrownOutcome::new(CrownEvaluation::Refreshed { crown }, message))
                }
                WriteOutcome::Conflict => Ok(conflict_outcome(artist, Some(current.clone()))),
            };
        }

        let challenger_count = self
            .challenger_play_count(&current.artist_name, top, top_user)
            .await;

        // The outgoing record keeps the provider's count, even below what was cached
        match crowns::steal_crown(&self.pool, current, verified, top_user, challenger_count, now)
            .await?
        {
            WriteOutcome::Applied(StolenCrown { previous, current }) => {
                let message = format!(
                    "{} stole the crown for {} from {}! ({} vs {} plays)",
                    top.display_name,
                    current.artist_name,
                    holder_name,
                    current.current_play_count,
                    previous.current_play_count
                );
                Ok(CrownOutcome::new(
                    CrownEvaluation::Stolen { previous, current },
                    message,
                ))
            }
            WriteOutcome::Conflict => Ok(conflict_outcome(artist, Some(current.clone()))),
        }
    }

    /// Challenger's count for the new record: the aggregate store when it is
    /// ahead of the cached ranking, else the cached count
    async fn challenger_play_count(
        &self,
        artist: &str,
        top: &LeaderboardEntry,
        user_id: UserId,
    ) -> i64 {
        match self.store.get_aggregate_play_count(artist, user_id).await {
            Ok(aggregate) => top.play_count.max(aggregate),
            Err(e) => {
                warn!(user_id, artist, error = %e, "Aggregate play count unavailable, using cached count");
                top.play_count
            }
        }
    }

    /// Refresh the holder's cached lists in the background so the next
    /// leaderboard shows their real count
    fn spawn_holder_refresh(&self, user_id: UserId) {
        let leaderboards = Arc::clone(&self.leaderboards);
        tokio::spawn(async move {
            if let Err(e) = leaderboards.refresh_user(user_id).await {
                warn!(user_id, error = %e, "Background top-list refresh failed");
            }
        });
    }

    pub async fn list_crowns_for_guild(&self, guild_id: GuildId) -> Result<Vec<CrownRecord>> {
        crowns::list_crowns_for_guild(&self.pool, guild_id).await
    }

    pub async fn list_crowns_for_user(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Vec<CrownRecord>> {
        crowns::list_crowns_for_user(&self.pool, guild_id, user_id).await
    }

    pub async fn crown_history(&self, guild_id: GuildId, artist: &str) -> Result<Vec<CrownRecord>> {
        crowns::list_crown_history(&self.pool, guild_id, artist).await
    }

    pub async fn top_crown_holders(
        &self,
        guild_id: GuildId,
        limit: usize,
    ) -> Result<Vec<(UserId, i64)>> {
        crowns::top_crown_holders(&self.pool, guild_id, limit).await
    }

    pub async fn remove_all_crowns_for_guild(&self, guild_id: GuildId) -> Result<u64> {
        crowns::remove_all_crowns_for_guild(&self.pool, guild_id).await
    }

    pub async fn remove_all_crowns_for_user(&self, user_id: UserId) -> Result<u64> {
        crowns::remove_all_crowns_for_user(&self.pool, user_id).await
    }

    pub async fn remove_member_crowns(&self, guild_id: GuildId, user_id: UserId) -> Result<u64> {
        crowns::remove_member_crowns(&self.pool, guild_id, user_id).await
    }

    pub async fn remove_seeded_crowns(&self, guild_id: GuildId) -> Result<u64> {
        crowns::remove_seeded_crowns(&self.pool, guild_id).await
    }
}

/// Highest-count entry; on a tie the current holder wins
fn top_candidate(
    eligible: &[LeaderboardEntry],
    holder: Option<UserId>,
) -> Option<&LeaderboardEntry> {
    let max = eligible.iter().map(|e| e.play_count).max()?;
    let mut leaders = eligible.iter().filter(|e| e.play_count == max);

    match holder {
        Some(holder) => eligible
            .iter()
            .find(|e| e.play_count == max && e.user_id == Some(holder))
            .or_else(|| leaders.next()),
        None => leaders.next(),
    }
}

fn conflict_outcome(artist: &str, crown: Option<CrownRecord>) -> CrownOutcome {
    debug!(artist, "Crown write lost to a concurrent evaluation");
    CrownOutcome::new(
        CrownEvaluation::NoChange {
            reason: NoChangeReason::WriteConflict,
            crown,
        },
        format!("The crown for {} changed while this was being evaluated.", artist),
    )
}

fn plural<'a>(count: i64, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 {
        one
    } else {
        many
    }
}
