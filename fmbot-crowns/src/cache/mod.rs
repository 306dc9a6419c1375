//! Per-user top-list cache
//!
//! Leaderboards read every member's aggregated top lists; scanning the store
//! per request would be too slow, so lists are cached per user with a TTL.
//! The cache is shared by all concurrent evaluations and may serve data up to
//! one TTL old.

mod memory;

pub use memory::MemoryTopListCache;

use crate::types::{EntityKey, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A user's aggregated play counts, indexed by normalized entity key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserTopLists {
    counts: HashMap<EntityKey, i64>,
}

impl UserTopLists {
    /// Index store rows; duplicate keys (differing only in case) are summed
    pub fn from_entities(entities: Vec<(EntityKey, i64)>) -> Self {
        let mut counts = HashMap::with_capacity(entities.len());
        for (key, play_count) in entities {
            *counts.entry(key.normalized()).or_insert(0) += play_count;
        }
        Self { counts }
    }

    pub fn play_count(&self, entity: &EntityKey) -> Option<i64> {
        self.counts
            .get(&entity.normalized())
            .copied()
            .filter(|count| *count > 0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Key/value cache with TTL and explicit invalidation
#[async_trait]
pub trait TopListCache: Send + Sync {
    /// Fresh entry for the user, if any
    async fn get(&self, user_id: UserId) -> Option<Arc<UserTopLists>>;

    async fn insert(&self, user_id: UserId, lists: Arc<UserTopLists>);

    async fn invalidate(&self, user_id: UserId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let lists = UserTopLists::from_entities(vec![
            (EntityKey::artist("Boards of Canada"), 120),
            (EntityKey::album("Boards of Canada", "Geogaddi"), 40),
        ]);

        assert_eq!(lists.play_count(&EntityKey::artist("boards OF canada")), Some(120));
        assert_eq!(
            lists.play_count(&EntityKey::album("BOARDS of Canada", "geogaddi")),
            Some(40)
        );
        assert_eq!(lists.play_count(&EntityKey::artist("Autechre")), None);
    }

    #[test]
    fn test_artist_and_track_with_same_name_do_not_collide() {
        let lists = UserTopLists::from_entities(vec![
            (EntityKey::artist("Low"), 10),
            (EntityKey::track("Low", "Low"), 3),
        ]);

        assert_eq!(lists.play_count(&EntityKey::artist("Low")), Some(10));
        assert_eq!(lists.play_count(&EntityKey::track("Low", "Low")), Some(3));
        assert_eq!(lists.len(), 2);
    }

    #[test]
    fn test_zero_counts_read_as_missing() {
        let lists = UserTopLists::from_entities(vec![(EntityKey::artist("Can"), 0)]);
        assert_eq!(lists.play_count(&EntityKey::artist("Can")), None);
    }
}
