//! fmbot-crowns library interface
//!
//! Guild leaderboards ("who knows"), crown ownership and the global abuse
//! filter, exposed over HTTP to the chat layer.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use crate::cache::TopListCache;
use crate::config::LeaderboardSettings;
use crate::services::{CrownLedger, CrownSeeder, GlobalLeaderboard, LeaderboardBuilder, WhoKnowsService};
use crate::types::{ArtistPlayCountVerifier, PlayHistoryStore};
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub whoknows: Arc<WhoKnowsService>,
    pub ledger: Arc<CrownLedger>,
    pub seeder: Arc<CrownSeeder>,
    pub leaderboards: Arc<LeaderboardBuilder>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the services around one store, cache and verifier
    pub fn new(
        db: SqlitePool,
        store: Arc<dyn PlayHistoryStore>,
        cache: Arc<dyn TopListCache>,
        verifier: Arc<dyn ArtistPlayCountVerifier>,
        leaderboard_settings: &LeaderboardSettings,
        filter_retention_days: i64,
    ) -> Self {
        let leaderboards = Arc::new(LeaderboardBuilder::new(
            Arc::clone(&store),
            cache,
            leaderboard_settings.list_limit,
        ));
        let ledger = Arc::new(CrownLedger::new(
            db.clone(),
            Arc::clone(&store),
            verifier,
            Arc::clone(&leaderboards),
        ));
        let global = Arc::new(GlobalLeaderboard::new(
            Arc::clone(&store),
            db.clone(),
            leaderboard_settings.list_limit,
            filter_retention_days,
        ));
        let whoknows = Arc::new(WhoKnowsService::new(
            db.clone(),
            Arc::clone(&leaderboards),
            Arc::clone(&ledger),
            global,
        ));
        let seeder = Arc::new(CrownSeeder::new(db.clone(), store));

        Self {
            db,
            whoknows,
            ledger,
            seeder,
            leaderboards,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::whoknows_routes())
        .merge(api::crown_routes())
        .merge(api::filtered_user_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
