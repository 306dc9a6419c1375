//! In-process TTL cache

use super::{TopListCache, UserTopLists};
use crate::types::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct CachedLists {
    lists: Arc<UserTopLists>,
    inserted_at: Instant,
}

/// Process-wide cache backed by a `RwLock<HashMap>`
///
/// Expired entries are dropped lazily on read and on insert.
pub struct MemoryTopListCache {
    ttl: Duration,
    entries: RwLock<HashMap<UserId, CachedLists>>,
}

impl MemoryTopListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TopListCache for MemoryTopListCache {
    async fn get(&self, user_id: UserId) -> Option<Arc<UserTopLists>> {
        {
            let entries = self.entries.read().await;
            match entries.get(&user_id) {
                Some(cached) if cached.inserted_at.elapsed() < self.ttl => {
                    return Some(Arc::clone(&cached.lists));
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict under the write lock, re-checking in case a
        // concurrent refresh replaced it meanwhile
        let mut entries = self.entries.write().await;
        if let Some(cached) = entries.get(&user_id) {
            if cached.inserted_at.elapsed() < self.ttl {
                return Some(Arc::clone(&cached.lists));
            }
            entries.remove(&user_id);
            debug!(user_id, "Evicted expired top-list cache entry");
        }
        None
    }

    async fn insert(&self, user_id: UserId, lists: Arc<UserTopLists>) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, cached| cached.inserted_at.elapsed() < ttl);
        entries.insert(
            user_id,
            CachedLists {
                lists,
                inserted_at: Instant::now(),
            },
        );
    }

    async fn invalidate(&self, user_id: UserId) {
        self.entries.write().await.remove(&user_id);
    }
}
