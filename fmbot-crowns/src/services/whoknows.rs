//! "Who knows" request flows
//!
//! Ties the policy filter, leaderboard builder and crown ledger together for
//! one guild request. Crown evaluation runs only for artists and never fails
//! the request: the leaderboard is returned even when the ledger errors.

use crate::db::guilds::{load_guild_members, load_guild_policy};
use crate::services::crown_ledger::{CrownLedger, CrownOutcome};
use crate::services::leaderboard::{GlobalLeaderboard, LeaderboardBuilder};
use crate::services::policy_filter::{crown_eligible_entries, filter_members};
use crate::types::{BlockScope, EntityKey, GuildId, LeaderboardEntry};
use chrono::Utc;
use fmbot_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct WhoKnowsResult {
    pub entity: EntityKey,
    pub entries: Vec<LeaderboardEntry>,
    /// Listeners before truncation to the list limit
    pub total_listeners: usize,
    pub total_play_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crown: Option<CrownOutcome>,
}

pub struct WhoKnowsService {
    pool: SqlitePool,
    leaderboards: Arc<LeaderboardBuilder>,
    ledger: Arc<CrownLedger>,
    global: Arc<GlobalLeaderboard>,
}

impl WhoKnowsService {
    pub fn new(
        pool: SqlitePool,
        leaderboards: Arc<LeaderboardBuilder>,
        ledger: Arc<CrownLedger>,
        global: Arc<GlobalLeaderboard>,
    ) -> Self {
        Self {
            pool,
            leaderboards,
            ledger,
            global,
        }
    }

    /// Guild leaderboard for an entity; artists also get a crown evaluation
    pub async fn guild(&self, guild_id: GuildId, entity: EntityKey) -> Result<WhoKnowsResult> {
        entity.validate()?;

        let policy = load_guild_policy(&self.pool, guild_id).await?;
        let members = load_guild_members(&self.pool, guild_id).await?;
        let now = Utc::now();

        let visible = filter_members(&members, &policy, BlockScope::WhoKnows, now);
        let mut entries = self.leaderboards.build_all(&visible, &entity).await?;

        let crown = match &entity {
            EntityKey::Artist { name } => {
                let eligible = crown_eligible_entries(&entries, &members, &policy, now);
                match self.ledger.evaluate(&policy, name.trim(), &eligible).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(guild_id, artist = %name, error = %e, "Crown evaluation failed");
                        None
                    }
                }
            }
            EntityKey::Album { .. } | EntityKey::Track { .. } => None,
        };

        let total_listeners = entries.len();
        let total_play_count = entries.iter().map(|e| e.play_count).sum();
        entries.truncate(self.leaderboards.list_limit());

        Ok(WhoKnowsResult {
            entity,
            entries,
            total_listeners,
            total_play_count,
            crown,
        })
    }

    pub async fn artist(&self, guild_id: GuildId, name: &str) -> Result<WhoKnowsResult> {
        self.guild(guild_id, EntityKey::artist(name)).await
    }

    pub async fn album(&self, guild_id: GuildId, artist: &str, name: &str) -> Result<WhoKnowsResult> {
        self.guild(guild_id, EntityKey::album(artist, name)).await
    }

    pub async fn track(&self, guild_id: GuildId, artist: &str, name: &str) -> Result<WhoKnowsResult> {
        self.guild(guild_id, EntityKey::track(artist, name)).await
    }

    /// Cross-guild leaderboard; never touches crowns
    pub async fn global(&self, entity: EntityKey) -> Result<WhoKnowsResult> {
        let entries = self.global.build(&entity).await?;
        Ok(WhoKnowsResult {
            entity,
            total_listeners: entries.len(),
            total_play_count: entries.iter().map(|e| e.play_count).sum(),
            entries,
            crown: None,
        })
    }
}
