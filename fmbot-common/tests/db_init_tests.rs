//! Database initialization against on-disk databases

use chrono::Utc;
use fmbot_common::db::artist_key;
use fmbot_common::db::init::init_database;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sub").join("fmbot.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("fmbot.db");

    let pool1 = init_database(&db_path).await.expect("first open");
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_expected_tables_exist() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("fmbot.db")).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in [
        "crowns",
        "global_filtered_users",
        "guild_blocked_users",
        "guild_users",
        "guilds",
        "settings",
        "tracks",
        "user_albums",
        "user_artists",
        "user_plays",
        "user_tracks",
        "users",
    ] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_second_active_crown_rejected_by_storage() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("fmbot.db")).await.unwrap();

    sqlx::query("INSERT INTO guilds (guild_id, discord_guild_id) VALUES (1, 1001)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO users (user_id, discord_user_id, user_name_last_fm) VALUES (1, 11, 'a'), (2, 22, 'b')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let insert = r#"
        INSERT INTO crowns (guild_id, user_id, artist_name, artist_key, active, created_at,
                            modified_at, start_play_count, current_play_count)
        VALUES (1, ?, ?, ?, 1, ?, ?, 50, 50)
    "#;
    let now = Utc::now();

    sqlx::query(insert)
        .bind(1_i64)
        .bind("Björk")
        .bind(artist_key("Björk"))
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

    // Same artist, different case (including non-ASCII letters): same slot
    let second = sqlx::query(insert)
        .bind(2_i64)
        .bind("BJÖRK")
        .bind(artist_key("BJÖRK"))
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await;

    assert!(second.is_err(), "unique active index must reject a second active crown");

    // Inactive history rows are allowed alongside the active one
    sqlx::query(
        r#"
        INSERT INTO crowns (guild_id, user_id, artist_name, artist_key, active, created_at,
                            modified_at, start_play_count, current_play_count)
        VALUES (1, 2, 'björk', 'björk', 0, ?, ?, 40, 40)
        "#,
    )
    .bind(now)
    .bind(now)
    .execute(&pool)
    .await
    .expect("inactive rows are not constrained");
}
