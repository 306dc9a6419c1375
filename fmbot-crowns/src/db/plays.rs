//! SQLite-backed play history store

use crate::types::{
    ArtistTopListener, EntityKey, EntityListener, Play, PlayHistoryStore, PrivacyLevel, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fmbot_common::Result;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;

/// Play history store over the `user_*` aggregate tables and `user_plays`
#[derive(Clone)]
pub struct SqlitePlayStore {
    pool: SqlitePool,
}

impl SqlitePlayStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlayHistoryStore for SqlitePlayStore {
    async fn get_top_entities_for_user(&self, user_id: UserId) -> Result<Vec<(EntityKey, i64)>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, i64)>(
            r#"
            SELECT 'artist', name, NULL, playcount FROM user_artists WHERE user_id = ?1
            UNION ALL
            SELECT 'album', artist_name, name, playcount FROM user_albums WHERE user_id = ?1
            UNION ALL
            SELECT 'track', artist_name, name, playcount FROM user_tracks WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(kind, artist, name, playcount)| {
                let key = match (kind.as_str(), name) {
                    ("artist", _) => EntityKey::artist(artist),
                    ("album", Some(name)) => EntityKey::album(artist, name),
                    ("track", Some(name)) => EntityKey::track(artist, name),
                    _ => return None,
                };
                Some((key, playcount))
            })
            .collect())
    }

    async fn get_aggregate_play_count(&self, artist: &str, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(playcount), 0) FROM user_artists WHERE user_id = ? AND name = ?",
        )
        .bind(user_id)
        .bind(artist)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn get_highest_play_count_per_artist(
        &self,
        member_ids: &[UserId],
    ) -> Result<Vec<ArtistTopListener>> {
        if member_ids.is_empty() {
            return Ok(Vec::new());
        }

        // `name` is NOCASE, so the partition folds artist spellings together
        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT artist_name, user_id, playcount FROM (
                SELECT name AS artist_name, user_id, playcount,
                       ROW_NUMBER() OVER (
                           PARTITION BY name
                           ORDER BY playcount DESC, user_id ASC
                       ) AS rn
                FROM user_artists
                WHERE playcount > 0 AND user_id IN (
            "#,
        );
        let mut ids = query.separated(", ");
        for user_id in member_ids {
            ids.push_bind(*user_id);
        }
        ids.push_unseparated(")) WHERE rn = 1 ORDER BY playcount DESC, artist_name");

        let rows = query
            .build_query_as::<(String, i64, i64)>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(artist_name, user_id, play_count)| ArtistTopListener {
                artist_name,
                user_id,
                play_count,
            })
            .collect())
    }

    async fn get_plays_in_window(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Play>> {
        let rows = sqlx::query_as::<_, (i64, String, Option<String>, String, DateTime<Utc>)>(
            r#"
            SELECT user_id, artist_name, album_name, track_name, time_played
            FROM user_plays
            WHERE user_id = ? AND time_played >= ? AND time_played < ?
            ORDER BY time_played
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, artist_name, album_name, track_name, time_played)| Play {
                user_id,
                artist_name,
                album_name,
                track_name,
                time_played,
            })
            .collect())
    }

    async fn users_with_plays_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserId>> {
        let users: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT user_id FROM user_plays
            WHERE time_played >= ? AND time_played < ?
            ORDER BY user_id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn get_track_duration(&self, artist: &str, track: &str) -> Result<Option<i64>> {
        let duration_ms: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT duration_ms FROM tracks WHERE artist_name = ? AND name = ?",
        )
        .bind(artist)
        .bind(track)
        .fetch_optional(&self.pool)
        .await?;

        Ok(duration_ms.flatten().map(|ms| ms / 1000))
    }

    async fn get_top_users_for_entity(
        &self,
        entity: &EntityKey,
        limit: usize,
        excluded: &HashSet<UserId>,
    ) -> Result<Vec<EntityListener>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT u.user_id, u.discord_user_id, u.user_name_last_fm, u.privacy_level,
                   SUM(e.playcount) AS playcount
            "#,
        );

        match entity {
            EntityKey::Artist { name } => {
                query.push(" FROM user_artists e JOIN users u ON u.user_id = e.user_id WHERE e.name = ");
                query.push_bind(name.trim().to_string());
            }
            EntityKey::Album { artist, name } => {
                query.push(" FROM user_albums e JOIN users u ON u.user_id = e.user_id WHERE e.artist_name = ");
                query.push_bind(artist.trim().to_string());
                query.push(" AND e.name = ");
                query.push_bind(name.trim().to_string());
            }
            EntityKey::Track { artist, name } => {
                query.push(" FROM user_tracks e JOIN users u ON u.user_id = e.user_id WHERE e.artist_name = ");
                query.push_bind(artist.trim().to_string());
                query.push(" AND e.name = ");
                query.push_bind(name.trim().to_string());
            }
        }

        if !excluded.is_empty() {
            query.push(" AND e.user_id NOT IN (");
            let mut ids = query.separated(", ");
            for user_id in excluded {
                ids.push_bind(*user_id);
            }
            ids.push_unseparated(")");
        }

        query.push(" GROUP BY u.user_id HAVING SUM(e.playcount) > 0 ORDER BY playcount DESC, u.user_id LIMIT ");
        query.push_bind(limit as i64);

        let rows = query
            .build_query_as::<(i64, i64, String, String, i64)>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(user_id, discord_user_id, lastfm_user_name, privacy_level, play_count)| {
                    EntityListener {
                        user_id,
                        discord_user_id,
                        lastfm_user_name,
                        privacy_level: PrivacyLevel::from_db(&privacy_level),
                        play_count,
                    }
                },
            )
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use fmbot_common::db::init_memory_database;

    async fn store_with_users() -> (SqlitePool, SqlitePlayStore) {
        let pool = init_memory_database().await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO users (user_id, discord_user_id, user_name_last_fm, privacy_level)
            VALUES (1, 101, 'a', 'global'), (2, 102, 'b', 'server'), (3, 103, 'c', 'global')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO user_artists (user_id, name, playcount) VALUES
                (1, 'Radiohead', 50), (2, 'radiohead', 80), (3, 'Radiohead', 80),
                (1, 'Björk', 12), (3, 'Muse', 0)
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO user_albums (user_id, artist_name, name, playcount) VALUES
                (1, 'Radiohead', 'Kid A', 20), (2, 'Radiohead', 'Kid A', 5)
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        let store = SqlitePlayStore::new(pool.clone());
        (pool, store)
    }

    #[tokio::test]
    async fn test_top_entities_cover_all_kinds() {
        let (_pool, store) = store_with_users().await;
        let entities = store.get_top_entities_for_user(1).await.unwrap();

        assert!(entities.contains(&(EntityKey::artist("Radiohead"), 50)));
        assert!(entities.contains(&(EntityKey::album("Radiohead", "Kid A"), 20)));
        assert_eq!(entities.len(), 3);
    }

    #[tokio::test]
    async fn test_aggregate_count_is_case_insensitive() {
        let (_pool, store) = store_with_users().await;
        assert_eq!(store.get_aggregate_play_count("RADIOHEAD", 2).await.unwrap(), 80);
        assert_eq!(store.get_aggregate_play_count("Portishead", 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_highest_per_artist_breaks_ties_by_user_id() {
        let (_pool, store) = store_with_users().await;
        let top = store.get_highest_play_count_per_artist(&[1, 2, 3]).await.unwrap();

        let radiohead: Vec<_> = top
            .iter()
            .filter(|t| t.artist_name.eq_ignore_ascii_case("radiohead"))
            .collect();
        assert_eq!(radiohead.len(), 1, "one holder per artist regardless of case");
        assert_eq!(radiohead[0].user_id, 2);
        assert_eq!(radiohead[0].play_count, 80);
        assert!(top.iter().all(|t| t.artist_name != "Muse"), "zero counts are skipped");
    }

    #[tokio::test]
    async fn test_highest_per_artist_respects_member_subset() {
        let (_pool, store) = store_with_users().await;
        let top = store.get_highest_play_count_per_artist(&[1]).await.unwrap();
        assert!(top.iter().all(|t| t.user_id == 1));
        assert!(store.get_highest_play_count_per_artist(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plays_window_is_half_open() {
        let (pool, store) = store_with_users().await;
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(8);

        for at in [start - Duration::seconds(1), start, end - Duration::seconds(1), end] {
            sqlx::query(
                "INSERT INTO user_plays (user_id, artist_name, track_name, time_played) VALUES (1, 'Radiohead', 'Airbag', ?)",
            )
            .bind(at)
            .execute(&pool)
            .await
            .unwrap();
        }

        let plays = store.get_plays_in_window(1, start, end).await.unwrap();
        assert_eq!(plays.len(), 2);
        assert_eq!(store.users_with_plays_in_window(start, end).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_track_duration_in_seconds() {
        let (pool, store) = store_with_users().await;
        sqlx::query("INSERT INTO tracks (artist_name, name, duration_ms) VALUES ('Radiohead', 'Airbag', 284000)")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(store.get_track_duration("radiohead", "AIRBAG").await.unwrap(), Some(284));
        assert_eq!(store.get_track_duration("Radiohead", "Lucky").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_top_users_for_entity_excludes_users() {
        let (_pool, store) = store_with_users().await;
        let excluded: HashSet<UserId> = [3].into_iter().collect();

        let listeners = store
            .get_top_users_for_entity(&EntityKey::artist("Radiohead"), 10, &excluded)
            .await
            .unwrap();

        let ids: Vec<_> = listeners.iter().map(|l| l.user_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(listeners[0].privacy_level, PrivacyLevel::Server);

        let albums = store
            .get_top_users_for_entity(&EntityKey::album("radiohead", "kid a"), 1, &HashSet::new())
            .await
            .unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].play_count, 20);
    }
}
