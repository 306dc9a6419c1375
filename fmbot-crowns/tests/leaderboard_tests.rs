//! Leaderboard and "who knows" flow tests

mod helpers;

use chrono::{Duration, Utc};
use fmbot_crowns::cache::MemoryTopListCache;
use fmbot_crowns::db::filtered_users::upsert_filtered_user;
use fmbot_crowns::db::guilds::load_guild_members;
use fmbot_crowns::db::SqlitePlayStore;
use fmbot_crowns::services::leaderboard::PRIVATE_USER_NAME;
use fmbot_crowns::services::LeaderboardBuilder;
use fmbot_crowns::types::{AbuseFilterRecord, AbuseReason, EntityKey, GuildId};
use helpers::*;
use std::sync::Arc;

const GUILD: GuildId = 3;

#[tokio::test]
async fn test_leaderboard_is_sorted_and_capped() {
    let pool = memory_pool().await;
    insert_guild(&pool, GUILD).await;
    for user_id in 1..=20 {
        add_listener(&pool, GUILD, user_id).await;
        set_artist_plays(&pool, user_id, "Mogwai", user_id * 3).await;
    }

    let state = test_state(&pool, Arc::new(FakeVerifier::new()));
    let result = state.whoknows.artist(GUILD, "mogwai").await.expect("who knows");

    assert_eq!(result.entries.len(), 14);
    assert_eq!(result.total_listeners, 20);
    assert_eq!(result.total_play_count, (1..=20).map(|u| u * 3).sum::<i64>());

    let counts: Vec<i64> = result.entries.iter().map(|e| e.play_count).collect();
    let mut sorted = counts.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(counts, sorted);
    assert_eq!(result.entries[0].user_id, Some(20));
    assert_eq!(result.entries[0].display_name, "member20");
}

#[tokio::test]
async fn test_ties_are_ordered_by_user_id() {
    let pool = memory_pool().await;
    insert_guild(&pool, GUILD).await;
    for user_id in [5, 2, 9] {
        add_listener(&pool, GUILD, user_id).await;
        set_artist_plays(&pool, user_id, "Low", 17).await;
    }

    let state = test_state(&pool, Arc::new(FakeVerifier::new()));
    let result = state.whoknows.artist(GUILD, "Low").await.expect("who knows");

    let ids: Vec<_> = result.entries.iter().map(|e| e.user_id).collect();
    assert_eq!(ids, vec![Some(2), Some(5), Some(9)]);
}

#[tokio::test]
async fn test_policy_filters_leaderboard_rows() {
    let pool = memory_pool().await;
    insert_guild(&pool, GUILD).await;
    sqlx::query("UPDATE guilds SET activity_threshold_days = 30 WHERE guild_id = ?")
        .bind(GUILD)
        .execute(&pool)
        .await
        .expect("set activity threshold");

    // 1: active, 2: blocked from who knows, 3: inactive, 4: unresolvable
    add_listener(&pool, GUILD, 1).await;
    add_listener(&pool, GUILD, 2).await;
    block_user(&pool, GUILD, 2, true, false).await;
    insert_user(&pool, 3, "server").await;
    add_member_with(&pool, GUILD, 3, Some(Utc::now() - Duration::days(45)), &[]).await;
    insert_user(&pool, 4, "server").await;
    add_unresolvable_member(&pool, GUILD, 4).await;
    for user_id in 1..=4 {
        set_artist_plays(&pool, user_id, "Stereolab", 10 * user_id).await;
    }

    let state = test_state(&pool, Arc::new(FakeVerifier::new()));
    let result = state.whoknows.artist(GUILD, "Stereolab").await.expect("who knows");

    let ids: Vec<_> = result.entries.iter().map(|e| e.user_id).collect();
    assert_eq!(ids, vec![Some(1)]);
}

#[tokio::test]
async fn test_cached_lists_are_served_until_refreshed() {
    let pool = memory_pool().await;
    insert_guild(&pool, GUILD).await;
    add_listener(&pool, GUILD, 1).await;
    set_artist_plays(&pool, 1, "Broadcast", 12).await;

    let state = test_state(&pool, Arc::new(FakeVerifier::new()));
    let first = state.whoknows.artist(GUILD, "Broadcast").await.expect("who knows");
    assert_eq!(first.entries[0].play_count, 12);

    set_artist_plays(&pool, 1, "Broadcast", 19).await;
    let cached = state.whoknows.artist(GUILD, "Broadcast").await.expect("who knows");
    assert_eq!(cached.entries[0].play_count, 12);

    state.leaderboards.refresh_user(1).await.expect("refresh");
    let fresh = state.whoknows.artist(GUILD, "Broadcast").await.expect("who knows");
    assert_eq!(fresh.entries[0].play_count, 19);
}

#[tokio::test]
async fn test_album_and_track_boards_skip_crowns() {
    let pool = memory_pool().await;
    insert_guild(&pool, GUILD).await;
    add_listener(&pool, GUILD, 1).await;
    add_listener(&pool, GUILD, 2).await;
    set_album_plays(&pool, 1, "Portishead", "Dummy", 90).await;
    set_album_plays(&pool, 2, "Portishead", "Dummy", 140).await;
    set_track_plays(&pool, 1, "Portishead", "Roads", 75).await;

    let state = test_state(&pool, Arc::new(FakeVerifier::new()));

    let album = state
        .whoknows
        .album(GUILD, "portishead", "DUMMY")
        .await
        .expect("album who knows");
    let ids: Vec<_> = album.entries.iter().map(|e| e.user_id).collect();
    assert_eq!(ids, vec![Some(2), Some(1)]);
    assert!(album.crown.is_none());

    let track = state
        .whoknows
        .track(GUILD, "Portishead", "Roads")
        .await
        .expect("track who knows");
    assert_eq!(track.entries.len(), 1);
    assert_eq!(track.entries[0].play_count, 75);
    assert!(track.crown.is_none());
    assert_eq!(active_crown_count(&pool, GUILD, "Portishead").await, 0);
}

#[tokio::test]
async fn test_member_whose_lists_fail_is_skipped() {
    let pool = memory_pool().await;
    insert_guild(&pool, GUILD).await;
    for user_id in 1..=3 {
        add_listener(&pool, GUILD, user_id).await;
        set_artist_plays(&pool, user_id, "Hood", 20 + user_id).await;
    }

    let store = FailingPlayStore::new(SqlitePlayStore::new(pool.clone()), [2]);
    let builder = LeaderboardBuilder::new(
        Arc::new(store),
        Arc::new(MemoryTopListCache::new(std::time::Duration::from_secs(60))),
        14,
    );
    let members = load_guild_members(&pool, GUILD).await.expect("members");

    let entries = builder
        .build_all(&members, &EntityKey::artist("Hood"))
        .await
        .expect("leaderboard");

    let ids: Vec<_> = entries.iter().map(|e| e.user_id).collect();
    assert_eq!(ids, vec![Some(3), Some(1)]);
}

#[tokio::test]
async fn test_leaderboards_build_on_spawned_tasks() {
    let pool = memory_pool().await;
    insert_guild(&pool, GUILD).await;
    for user_id in 1..=12 {
        add_listener(&pool, GUILD, user_id).await;
        set_artist_plays(&pool, user_id, "Slint", 10 + user_id).await;
    }

    let builder = Arc::new(LeaderboardBuilder::new(
        Arc::new(SqlitePlayStore::new(pool.clone())),
        Arc::new(MemoryTopListCache::new(std::time::Duration::from_secs(60))),
        14,
    ));
    let members = Arc::new(load_guild_members(&pool, GUILD).await.expect("members"));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..4 {
        let builder = Arc::clone(&builder);
        let members = Arc::clone(&members);
        tasks.spawn(async move {
            builder
                .build_all(&members, &EntityKey::artist("slint"))
                .await
        });
    }

    while let Some(result) = tasks.join_next().await {
        let entries = result.expect("task").expect("leaderboard");
        assert_eq!(entries.len(), 12);
        assert_eq!(entries[0].user_id, Some(12));
        assert_eq!(entries[11].user_id, Some(1));
    }

    let state = test_state(&pool, Arc::new(FakeVerifier::new()));
    let whoknows = tokio::spawn(async move { state.whoknows.artist(GUILD, "Slint").await })
        .await
        .expect("task")
        .expect("who knows");
    assert_eq!(whoknows.entries.len(), 12);
}

#[tokio::test]
async fn test_blank_name_and_unknown_guild_are_rejected() {
    let pool = memory_pool().await;
    insert_guild(&pool, GUILD).await;
    let state = test_state(&pool, Arc::new(FakeVerifier::new()));

    let err = state.whoknows.artist(GUILD, "   ").await.expect_err("blank name");
    assert!(matches!(err, fmbot_common::Error::InvalidInput(_)));

    let err = state.whoknows.artist(999, "Can").await.expect_err("unknown guild");
    assert!(matches!(err, fmbot_common::Error::NotFound(_)));
}

#[tokio::test]
async fn test_global_board_excludes_flagged_and_hides_private_users() {
    let pool = memory_pool().await;
    insert_user(&pool, 1, "global").await;
    insert_user(&pool, 2, "server").await;
    insert_user(&pool, 3, "global").await;
    set_artist_plays(&pool, 1, "Can", 100).await;
    set_artist_plays(&pool, 2, "Can", 80).await;
    set_artist_plays(&pool, 3, "Can", 5000).await;

    let now = Utc::now();
    upsert_filtered_user(
        &pool,
        &AbuseFilterRecord {
            user_id: 3,
            reason: AbuseReason::ExcessPlayRate,
            window_start: now - Duration::days(11),
            window_end: now - Duration::days(3),
            play_count: 5000,
            listening_seconds: 5000 * 200,
        },
        now,
    )
    .await
    .expect("flag user");

    let state = test_state(&pool, Arc::new(FakeVerifier::new()));
    let result = state
        .whoknows
        .global(EntityKey::artist("Can"))
        .await
        .expect("global who knows");

    assert_eq!(result.entries.len(), 2);
    assert_eq!(result.entries[0].user_id, Some(1));
    assert_eq!(result.entries[0].display_name, lastfm_name(1));

    let private = &result.entries[1];
    assert_eq!(private.user_id, None);
    assert_eq!(private.display_name, PRIVATE_USER_NAME);
    assert_eq!(private.lastfm_user_name, None);
    assert_eq!(private.play_count, 80);
    assert!(result.crown.is_none());
}
