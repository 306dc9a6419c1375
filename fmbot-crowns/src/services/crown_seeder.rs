//! Crown seeder
//!
//! Bulk (re)derivation of a guild's crowns from aggregate play counts. Seeded
//! crowns are replaceable; crowns earned through evaluation are never touched.

use crate::config::CrownSettings;
use crate::db::crowns::{self, SeedCrown};
use crate::db::guilds::{load_guild_members, load_guild_policy};
use crate::services::crown_ledger::claim_floor;
use crate::services::policy_filter::crown_eligible_user_ids;
use crate::types::{GuildId, PlayHistoryStore, UserId};
use crate::utils::retry_on_lock;
use chrono::Utc;
use fmbot_common::db::{artist_key, CrownRecord};
use fmbot_common::Result;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Total time the replace transaction may spend waiting on SQLite locks
const SEED_MAX_LOCK_WAIT_MS: u64 = 5000;

pub struct CrownSeeder {
    pool: SqlitePool,
    store: Arc<dyn PlayHistoryStore>,
}

impl CrownSeeder {
    pub fn new(pool: SqlitePool, store: Arc<dyn PlayHistoryStore>) -> Self {
        Self { pool, store }
    }

    /// Replace the guild's seeded crowns; returns the number of crowns written
    pub async fn seed(&self, guild_id: GuildId) -> Result<usize> {
        let policy = load_guild_policy(&self.pool, guild_id).await?;
        if policy.crowns_disabled {
            info!(guild_id, "Crowns disabled, skipping seeding");
            return Ok(0);
        }

        let settings = CrownSettings::from_database(&self.pool).await?;
        let floor = claim_floor(&policy, &settings);
        let now = Utc::now();

        let members: Vec<_> = load_guild_members(&self.pool, guild_id)
            .await?
            .into_iter()
            .filter(|m| m.display_name.is_some())
            .collect();
        let mut eligible: Vec<UserId> = crown_eligible_user_ids(&members, &policy, now)
            .into_iter()
            .collect();
        eligible.sort_unstable();

        let top_listeners = self.store.get_highest_play_count_per_artist(&eligible).await?;

        let existing = crowns::list_crowns_for_guild(&self.pool, guild_id).await?;
        let organic: HashSet<String> = existing
            .iter()
            .filter(|c| !c.is_seeded)
            .map(|c| artist_key(&c.artist_name))
            .collect();
        let previous_seeds: HashMap<(String, UserId), &CrownRecord> = existing
            .iter()
            .filter(|c| c.is_seeded)
            .map(|c| ((artist_key(&c.artist_name), c.user_id), c))
            .collect();

        let mut seen = HashSet::new();
        let mut seeds = Vec::new();
        for listener in top_listeners {
            if listener.play_count < floor {
                continue;
            }
            let key = artist_key(&listener.artist_name);
            if organic.contains(&key) || !seen.insert(key.clone()) {
                continue;
            }

            let seed = match previous_seeds.get(&(key, listener.user_id)) {
                Some(prior) => SeedCrown {
                    crown_id: Some(prior.crown_id),
                    version: prior.version + 1,
                    user_id: listener.user_id,
                    artist_name: prior.artist_name.clone(),
                    created_at: prior.created_at,
                    modified_at: if prior.current_play_count == listener.play_count {
                        prior.modified_at
                    } else {
                        now
                    },
                    start_play_count: prior.start_play_count.min(listener.play_count),
                    current_play_count: listener.play_count,
                },
                None => SeedCrown {
                    crown_id: None,
                    version: 0,
                    user_id: listener.user_id,
                    artist_name: listener.artist_name.trim().to_string(),
                    created_at: now,
                    modified_at: now,
                    start_play_count: listener.play_count,
                    current_play_count: listener.play_count,
                },
            };
            seeds.push(seed);
        }

        let written = retry_on_lock("crown seeding", SEED_MAX_LOCK_WAIT_MS, || {
            crowns::replace_seeded_crowns(&self.pool, guild_id, &seeds)
        })
        .await?;

        info!(
            guild_id,
            written,
            candidates = seeds.len(),
            skipped_organic = organic.len(),
            "Seeded crowns"
        );

        Ok(written)
    }
}
