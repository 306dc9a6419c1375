//! fmbot-crowns - guild leaderboards and crowns service
//!
//! Serves "who knows" leaderboards and crown state to the chat layer over
//! HTTP and runs the global abuse filter in the background.

use anyhow::{Context, Result};
use clap::Parser;
use fmbot_common::config::{
    default_config_path, load_toml_config, prepare_root_folder, resolve_root_folder,
};
use fmbot_crowns::cache::MemoryTopListCache;
use fmbot_crowns::config::{resolve_lastfm_api_key, AbuseFilterConfig, LeaderboardSettings};
use fmbot_crowns::db::SqlitePlayStore;
use fmbot_crowns::services::{AbuseFilter, LastfmClient};
use fmbot_crowns::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fmbot-crowns", version, about = "Guild leaderboards and crowns service")]
struct Args {
    /// Root folder holding the database
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Path to fmbot.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let toml_config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting fmbot-crowns");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = prepare_root_folder(&root_folder)?;
    info!("Database: {}", db_path.display());

    let db_pool = fmbot_common::db::init_database(&db_path).await?;
    info!("Database connection established");

    let api_key = resolve_lastfm_api_key(&db_pool, &toml_config).await?;
    let lastfm = Arc::new(LastfmClient::new(api_key)?);

    let leaderboard_settings = LeaderboardSettings::from_database(&db_pool).await?;
    let abuse_config = AbuseFilterConfig::from_database(&db_pool).await?;
    info!(
        cache_ttl_secs = leaderboard_settings.cache_ttl.as_secs(),
        list_limit = leaderboard_settings.list_limit,
        "Leaderboard settings loaded"
    );

    let store = Arc::new(SqlitePlayStore::new(db_pool.clone()));
    let cache = Arc::new(MemoryTopListCache::new(leaderboard_settings.cache_ttl));

    let state = AppState::new(
        db_pool.clone(),
        store.clone(),
        cache,
        lastfm,
        &leaderboard_settings,
        abuse_config.retention_days,
    );

    let shutdown = CancellationToken::new();
    let abuse_filter = Arc::new(AbuseFilter::new(db_pool.clone(), store, abuse_config));
    let scan_handle = abuse_filter.spawn_periodic(shutdown.clone());

    let app = fmbot_crowns::build_router(state);

    let bind_address = toml_config.http.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    scan_handle.await?;
    db_pool.close().await;

    Ok(())
}
