//! Test helper utilities
//!
//! Shared fixtures for fmbot-crowns integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;

pub use fakes::{FailingPlayStore, FakeVerifier};
pub use fixtures::*;

use fmbot_crowns::cache::MemoryTopListCache;
use fmbot_crowns::config::LeaderboardSettings;
use fmbot_crowns::db::SqlitePlayStore;
use fmbot_crowns::AppState;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Private in-memory database with the full schema
pub async fn memory_pool() -> SqlitePool {
    fmbot_common::db::init_memory_database()
        .await
        .expect("Failed to create in-memory database")
}

/// On-disk database with a multi-connection pool (for concurrency tests)
///
/// The TempDir must be kept alive for the duration of the test.
pub async fn file_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("fmbot-test.db");
    let pool = fmbot_common::db::init_database(&db_path)
        .await
        .expect("Failed to create test database");
    (temp_dir, pool)
}

/// Fully wired state over the SQLite store, a fresh cache and `verifier`
pub fn test_state(pool: &SqlitePool, verifier: Arc<FakeVerifier>) -> AppState {
    let settings = LeaderboardSettings::default();
    AppState::new(
        pool.clone(),
        Arc::new(SqlitePlayStore::new(pool.clone())),
        Arc::new(MemoryTopListCache::new(Duration::from_secs(25 * 60))),
        verifier,
        &settings,
        90,
    )
}
