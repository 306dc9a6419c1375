//! Test doubles for the external seams

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fmbot_common::{Error, Result};
use fmbot_crowns::types::{
    ArtistPlayCountVerifier, ArtistTopListener, EntityKey, EntityListener, Play,
    PlayHistoryStore, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Verifier answering from a fixed table keyed by Last.fm user name
#[derive(Default)]
pub struct FakeVerifier {
    counts: Mutex<HashMap<String, i64>>,
    failing: Mutex<bool>,
    calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, lastfm_user_name: &str, count: i64) {
        self.counts
            .lock()
            .unwrap()
            .insert(lastfm_user_name.to_lowercase(), count);
    }

    /// Every lookup fails until reset
    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtistPlayCountVerifier for FakeVerifier {
    async fn get_authoritative_artist_play_count(
        &self,
        _artist: &str,
        lastfm_user_name: &str,
    ) -> Result<Option<i64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(Error::Provider("provider offline".to_string()));
        }
        Ok(self
            .counts
            .lock()
            .unwrap()
            .get(&lastfm_user_name.to_lowercase())
            .copied())
    }
}

/// Delegating store whose per-user reads fail for selected users
pub struct FailingPlayStore<S> {
    inner: S,
    failing_users: HashSet<UserId>,
}

impl<S> FailingPlayStore<S> {
    pub fn new(inner: S, failing_users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            inner,
            failing_users: failing_users.into_iter().collect(),
        }
    }

    fn check(&self, user_id: UserId) -> Result<()> {
        if self.failing_users.contains(&user_id) {
            return Err(Error::Internal(format!("store unavailable for user {}", user_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: PlayHistoryStore> PlayHistoryStore for FailingPlayStore<S> {
    async fn get_top_entities_for_user(&self, user_id: UserId) -> Result<Vec<(EntityKey, i64)>> {
        self.check(user_id)?;
        self.inner.get_top_entities_for_user(user_id).await
    }

    async fn get_aggregate_play_count(&self, artist: &str, user_id: UserId) -> Result<i64> {
        self.check(user_id)?;
        self.inner.get_aggregate_play_count(artist, user_id).await
    }

    async fn get_highest_play_count_per_artist(
        &self,
        member_ids: &[UserId],
    ) -> Result<Vec<ArtistTopListener>> {
        self.inner.get_highest_play_count_per_artist(member_ids).await
    }

    async fn get_plays_in_window(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Play>> {
        self.check(user_id)?;
        self.inner.get_plays_in_window(user_id, start, end).await
    }

    async fn users_with_plays_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserId>> {
        self.inner.users_with_plays_in_window(start, end).await
    }

    async fn get_track_duration(&self, artist: &str, track: &str) -> Result<Option<i64>> {
        self.inner.get_track_duration(artist, track).await
    }

    async fn get_top_users_for_entity(
        &self,
        entity: &EntityKey,
        limit: usize,
        excluded: &HashSet<UserId>,
    ) -> Result<Vec<EntityListener>> {
        self.inner.get_top_users_for_entity(entity, limit, excluded).await
    }
}
