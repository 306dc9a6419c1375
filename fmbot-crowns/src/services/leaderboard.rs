//! Leaderboard builder ("who knows")
//!
//! One shape for artists, albums and tracks: for every eligible member read
//! that member's cached top lists (loading them from the store on a miss),
//! pick out the requested entity and rank by play count.

use crate::cache::{TopListCache, UserTopLists};
use crate::db::filtered_users::active_filtered_user_ids;
use crate::types::{EntityKey, GuildMember, LeaderboardEntry, PlayHistoryStore, PrivacyLevel, UserId};
use fmbot_common::time::{days_before, now};
use fmbot_common::Result;
use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of rows shown on a leaderboard
pub const DEFAULT_LIST_LIMIT: usize = 14;

/// Display name used for users who keep their identity to shared guilds
pub const PRIVATE_USER_NAME: &str = "Private user";

/// Concurrent top-list loads per leaderboard
const MEMBER_LOAD_CONCURRENCY: usize = 8;

pub struct LeaderboardBuilder {
    store: Arc<dyn PlayHistoryStore>,
    cache: Arc<dyn TopListCache>,
    list_limit: usize,
}

impl LeaderboardBuilder {
    pub fn new(
        store: Arc<dyn PlayHistoryStore>,
        cache: Arc<dyn TopListCache>,
        list_limit: usize,
    ) -> Self {
        Self {
            store,
            cache,
            list_limit: list_limit.max(1),
        }
    }

    pub fn list_limit(&self) -> usize {
        self.list_limit
    }

    /// Cached top lists for a user, loading from the store on a miss
    pub async fn top_lists_for(&self, user_id: UserId) -> Result<Arc<UserTopLists>> {
        if let Some(lists) = self.cache.get(user_id).await {
            debug!(user_id, "Top-list cache hit");
            return Ok(lists);
        }

        debug!(user_id, "Top-list cache miss");
        self.load_into_cache(user_id).await
    }

    /// Drop whatever is cached for the user and reload from the store
    pub async fn refresh_user(&self, user_id: UserId) -> Result<Arc<UserTopLists>> {
        self.cache.invalidate(user_id).await;
        self.load_into_cache(user_id).await
    }

    async fn load_into_cache(&self, user_id: UserId) -> Result<Arc<UserTopLists>> {
        let entities = self.store.get_top_entities_for_user(user_id).await?;
        let lists = Arc::new(UserTopLists::from_entities(entities));
        self.cache.insert(user_id, Arc::clone(&lists)).await;
        Ok(lists)
    }

    /// Full ranking for an entity, highest play count first
    ///
    /// Members without a resolvable display name, members whose lists fail
    /// to load, and members who never played the entity are left out.
    pub async fn build_all(
        &self,
        members: &[GuildMember],
        entity: &EntityKey,
    ) -> Result<Vec<LeaderboardEntry>> {
        entity.validate()?;

        let resolvable: Vec<&GuildMember> = members
            .iter()
            .filter(|m| {
                if m.display_name.is_none() {
                    debug!(user_id = m.user_id, "Skipping unresolvable member");
                    false
                } else {
                    true
                }
            })
            .collect();

        // `buffered` keeps input order, so results zip back onto `resolvable`
        let user_ids: Vec<UserId> = resolvable.iter().map(|m| m.user_id).collect();
        let loads: Vec<Result<Arc<UserTopLists>>> = stream::iter(user_ids)
            .map(|user_id| self.top_lists_for(user_id))
            .buffered(MEMBER_LOAD_CONCURRENCY)
            .collect()
            .await;

        let mut entries = Vec::new();
        for (member, lists) in resolvable.into_iter().zip(loads) {
            let lists = match lists {
                Ok(lists) => lists,
                Err(e) => {
                    warn!(user_id = member.user_id, error = %e, "Skipping member, top lists unavailable");
                    continue;
                }
            };

            if let Some(play_count) = lists.play_count(entity) {
                entries.push(LeaderboardEntry {
                    user_id: Some(member.user_id),
                    display_name: member.display_name.clone().unwrap_or_default(),
                    lastfm_user_name: Some(member.lastfm_user_name.clone()),
                    entity: entity.clone(),
                    play_count,
                    privacy_level: member.privacy_level,
                    discord_user_id: Some(member.discord_user_id),
                });
            }
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Ranking truncated to the list limit
    pub async fn build(
        &self,
        members: &[GuildMember],
        entity: &EntityKey,
    ) -> Result<Vec<LeaderboardEntry>> {
        let mut entries = self.build_all(members, entity).await?;
        entries.truncate(self.list_limit);
        Ok(entries)
    }
}

/// Descending by play count; ties broken by user id for a stable order
fn sort_entries(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| {
        b.play_count
            .cmp(&a.play_count)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
}

/// Cross-guild ranking read straight from the store
///
/// Users flagged by the abuse filter within the retention period are left
/// out; users who did not opt into global visibility are anonymised.
pub struct GlobalLeaderboard {
    store: Arc<dyn PlayHistoryStore>,
    pool: SqlitePool,
    list_limit: usize,
    retention_days: i64,
}

impl GlobalLeaderboard {
    pub fn new(
        store: Arc<dyn PlayHistoryStore>,
        pool: SqlitePool,
        list_limit: usize,
        retention_days: i64,
    ) -> Self {
        Self {
            store,
            pool,
            list_limit: list_limit.max(1),
            retention_days,
        }
    }

    pub async fn build(&self, entity: &EntityKey) -> Result<Vec<LeaderboardEntry>> {
        entity.validate()?;

        let since = days_before(now(), self.retention_days);
        let excluded = active_filtered_user_ids(&self.pool, since).await?;
        if !excluded.is_empty() {
            debug!(excluded = excluded.len(), "Excluding flagged users from global leaderboard");
        }

        let listeners = self
            .store
            .get_top_users_for_entity(entity, self.list_limit, &excluded)
            .await?;

        Ok(listeners
            .into_iter()
            .map(|listener| match listener.privacy_level {
                PrivacyLevel::Global => LeaderboardEntry {
                    user_id: Some(listener.user_id),
                    display_name: listener.lastfm_user_name.clone(),
                    lastfm_user_name: Some(listener.lastfm_user_name),
                    entity: entity.clone(),
                    play_count: listener.play_count,
                    privacy_level: PrivacyLevel::Global,
                    discord_user_id: Some(listener.discord_user_id),
                },
                PrivacyLevel::Server => LeaderboardEntry {
                    user_id: None,
                    display_name: PRIVATE_USER_NAME.to_string(),
                    lastfm_user_name: None,
                    entity: entity.clone(),
                    play_count: listener.play_count,
                    privacy_level: PrivacyLevel::Server,
                    discord_user_id: None,
                },
            })
            .collect())
    }
}
