//! Core domain types and the seams to external collaborators
//!
//! The play history store and the authoritative play-count provider are
//! traits so the leaderboard/crown logic can run against SQLite in production
//! and deterministic fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fmbot_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub type UserId = i64;
pub type GuildId = i64;

/// Entity a leaderboard is built for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKey {
    Artist { name: String },
    Album { artist: String, name: String },
    Track { artist: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    Album,
    Track,
}

impl EntityKey {
    pub fn artist(name: impl Into<String>) -> Self {
        EntityKey::Artist { name: name.into() }
    }

    pub fn album(artist: impl Into<String>, name: impl Into<String>) -> Self {
        EntityKey::Album {
            artist: artist.into(),
            name: name.into(),
        }
    }

    pub fn track(artist: impl Into<String>, name: impl Into<String>) -> Self {
        EntityKey::Track {
            artist: artist.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityKey::Artist { .. } => EntityKind::Artist,
            EntityKey::Album { .. } => EntityKind::Album,
            EntityKey::Track { .. } => EntityKind::Track,
        }
    }

    /// Artist the entity belongs to
    pub fn artist_name(&self) -> &str {
        match self {
            EntityKey::Artist { name } => name,
            EntityKey::Album { artist, .. } | EntityKey::Track { artist, .. } => artist,
        }
    }

    /// Case-folded copy used as a lookup key; names match case-insensitively
    pub fn normalized(&self) -> EntityKey {
        match self {
            EntityKey::Artist { name } => EntityKey::Artist {
                name: fold(name),
            },
            EntityKey::Album { artist, name } => EntityKey::Album {
                artist: fold(artist),
                name: fold(name),
            },
            EntityKey::Track { artist, name } => EntityKey::Track {
                artist: fold(artist),
                name: fold(name),
            },
        }
    }

    /// Rejects blank names before they reach the store
    pub fn validate(&self) -> Result<()> {
        let blank = match self {
            EntityKey::Artist { name } => name.trim().is_empty(),
            EntityKey::Album { artist, name } | EntityKey::Track { artist, name } => {
                artist.trim().is_empty() || name.trim().is_empty()
            }
        };
        if blank {
            return Err(fmbot_common::Error::InvalidInput(format!(
                "{:?} name must not be empty",
                self.kind()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Artist { name } => write!(f, "{}", name),
            EntityKey::Album { artist, name } | EntityKey::Track { artist, name } => {
                write!(f, "{} - {}", artist, name)
            }
        }
    }
}

fn fold(value: &str) -> String {
    fmbot_common::db::artist_key(value)
}

/// Who may see a user's identity on cross-guild leaderboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    /// Visible by name only inside guilds the user shares
    Server,
    /// Visible by name everywhere, including global leaderboards
    Global,
}

impl PrivacyLevel {
    pub fn from_db(value: &str) -> Self {
        match value {
            "global" => PrivacyLevel::Global,
            _ => PrivacyLevel::Server,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            PrivacyLevel::Server => "server",
            PrivacyLevel::Global => "global",
        }
    }
}

/// One guild roster entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMember {
    pub user_id: UserId,
    pub discord_user_id: i64,
    pub lastfm_user_name: String,
    /// Name on the chat platform; `None` when the member no longer resolves
    pub display_name: Option<String>,
    pub last_message: Option<DateTime<Utc>>,
    pub role_ids: Vec<i64>,
    pub privacy_level: PrivacyLevel,
}

/// One ranked row of a leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// `None` for anonymised rows on global leaderboards
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub lastfm_user_name: Option<String>,
    pub entity: EntityKey,
    pub play_count: i64,
    pub privacy_level: PrivacyLevel,
    pub discord_user_id: Option<i64>,
}

/// Which of the guild's block-lists applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockScope {
    WhoKnows,
    Crowns,
}

/// Guild-level leaderboard and crown policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildPolicy {
    pub guild_id: GuildId,
    pub activity_threshold_days: Option<i64>,
    pub crown_activity_threshold_days: Option<i64>,
    pub crown_min_play_count_threshold: Option<i64>,
    pub crowns_disabled: bool,
    pub who_knows_blocked_user_ids: HashSet<UserId>,
    pub crown_blocked_user_ids: HashSet<UserId>,
    /// Empty means every member may hold crowns
    pub crown_whitelist_role_ids: Vec<i64>,
}

impl GuildPolicy {
    pub fn blocked_user_ids(&self, scope: BlockScope) -> &HashSet<UserId> {
        match scope {
            BlockScope::WhoKnows => &self.who_knows_blocked_user_ids,
            BlockScope::Crowns => &self.crown_blocked_user_ids,
        }
    }
}

/// Single scrobble
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Play {
    pub user_id: UserId,
    pub artist_name: String,
    pub album_name: Option<String>,
    pub track_name: String,
    pub time_played: DateTime<Utc>,
}

/// Highest listener of one artist among a set of users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistTopListener {
    pub artist_name: String,
    pub user_id: UserId,
    pub play_count: i64,
}

/// Listener row used by global (cross-guild) leaderboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityListener {
    pub user_id: UserId,
    pub discord_user_id: i64,
    pub lastfm_user_name: String,
    pub privacy_level: PrivacyLevel,
    pub play_count: i64,
}

/// Why the abuse filter flagged a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbuseReason {
    ExcessPlaytime,
    ExcessPlayRate,
    ShortTrackAbuse,
}

impl AbuseReason {
    pub fn as_db(&self) -> &'static str {
        match self {
            AbuseReason::ExcessPlaytime => "excess-playtime",
            AbuseReason::ExcessPlayRate => "excess-play-rate",
            AbuseReason::ShortTrackAbuse => "short-track-abuse",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "excess-playtime" => Some(AbuseReason::ExcessPlaytime),
            "excess-play-rate" => Some(AbuseReason::ExcessPlayRate),
            "short-track-abuse" => Some(AbuseReason::ShortTrackAbuse),
            _ => None,
        }
    }
}

/// Output of one abuse filter scan for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseFilterRecord {
    pub user_id: UserId,
    pub reason: AbuseReason,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub play_count: i64,
    pub listening_seconds: i64,
}

/// Read side of the play history store
#[async_trait]
pub trait PlayHistoryStore: Send + Sync {
    /// Every artist, album and track the user has played, with play counts
    async fn get_top_entities_for_user(&self, user_id: UserId) -> Result<Vec<(EntityKey, i64)>>;

    /// Aggregated play count of one artist for one user (0 when never played)
    async fn get_aggregate_play_count(&self, artist: &str, user_id: UserId) -> Result<i64>;

    /// For each artist any of `member_ids` played, the single top listener
    async fn get_highest_play_count_per_artist(
        &self,
        member_ids: &[UserId],
    ) -> Result<Vec<ArtistTopListener>>;

    /// Raw plays in `[start, end)`
    async fn get_plays_in_window(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Play>>;

    /// Users with at least one play in `[start, end)`
    async fn users_with_plays_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserId>>;

    /// Known track duration in seconds
    async fn get_track_duration(&self, artist: &str, track: &str) -> Result<Option<i64>>;

    /// Top listeners across all users, skipping `excluded`
    async fn get_top_users_for_entity(
        &self,
        entity: &EntityKey,
        limit: usize,
        excluded: &HashSet<UserId>,
    ) -> Result<Vec<EntityListener>>;
}

/// Ground-truth play counts from the external music-data provider
#[async_trait]
pub trait ArtistPlayCountVerifier: Send + Sync {
    /// `Ok(None)` when the provider has no count for this user/artist
    async fn get_authoritative_artist_play_count(
        &self,
        artist: &str,
        lastfm_user_name: &str,
    ) -> Result<Option<i64>>;
}
