//! Crown management endpoints

use crate::types::{GuildId, UserId};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use fmbot_common::db::CrownRecord;
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_TOP_HOLDERS: usize = 10;
const MAX_TOP_HOLDERS: usize = 100;

#[derive(Debug, Serialize)]
pub struct CrownListResponse {
    pub crowns: Vec<CrownRecord>,
}

#[derive(Debug, Serialize)]
pub struct CrownHolder {
    pub user_id: UserId,
    pub crown_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TopHoldersResponse {
    pub holders: Vec<CrownHolder>,
}

#[derive(Debug, Serialize)]
pub struct SeedResponse {
    pub records_written: usize,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: u64,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub artist: String,
}

/// GET /api/guilds/:guild_id/crowns
pub async fn list_guild_crowns(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> ApiResult<Json<CrownListResponse>> {
    let crowns = state.ledger.list_crowns_for_guild(guild_id).await?;
    Ok(Json(CrownListResponse { crowns }))
}

/// GET /api/guilds/:guild_id/crowns/top?limit=
pub async fn top_holders(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Query(query): Query<TopQuery>,
) -> ApiResult<Json<TopHoldersResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TOP_HOLDERS)
        .clamp(1, MAX_TOP_HOLDERS);
    let holders = state
        .ledger
        .top_crown_holders(guild_id, limit)
        .await?
        .into_iter()
        .map(|(user_id, crown_count)| CrownHolder {
            user_id,
            crown_count,
        })
        .collect();

    Ok(Json(TopHoldersResponse { holders }))
}

/// GET /api/guilds/:guild_id/crowns/history?artist=
pub async fn crown_history(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<CrownListResponse>> {
    if query.artist.trim().is_empty() {
        return Err(ApiError::BadRequest("artist must not be empty".to_string()));
    }
    let crowns = state.ledger.crown_history(guild_id, &query.artist).await?;
    Ok(Json(CrownListResponse { crowns }))
}

/// GET /api/guilds/:guild_id/users/:user_id/crowns
pub async fn list_member_crowns(
    State(state): State<AppState>,
    Path((guild_id, user_id)): Path<(GuildId, UserId)>,
) -> ApiResult<Json<CrownListResponse>> {
    let crowns = state.ledger.list_crowns_for_user(guild_id, user_id).await?;
    Ok(Json(CrownListResponse { crowns }))
}

/// POST /api/guilds/:guild_id/crowns/seed
pub async fn seed_crowns(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> ApiResult<Json<SeedResponse>> {
    let records_written = state.seeder.seed(guild_id).await?;
    Ok(Json(SeedResponse { records_written }))
}

/// DELETE /api/guilds/:guild_id/crowns
pub async fn reset_guild_crowns(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> ApiResult<Json<RemovedResponse>> {
    let removed = state.ledger.remove_all_crowns_for_guild(guild_id).await?;
    info!(guild_id, removed, "Guild crowns reset via API");
    Ok(Json(RemovedResponse { removed }))
}

/// DELETE /api/guilds/:guild_id/crowns/seeded
pub async fn reset_seeded_crowns(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> ApiResult<Json<RemovedResponse>> {
    let removed = state.ledger.remove_seeded_crowns(guild_id).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// DELETE /api/guilds/:guild_id/users/:user_id/crowns
pub async fn remove_member_crowns(
    State(state): State<AppState>,
    Path((guild_id, user_id)): Path<(GuildId, UserId)>,
) -> ApiResult<Json<RemovedResponse>> {
    let removed = state.ledger.remove_member_crowns(guild_id, user_id).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// DELETE /api/users/:user_id/crowns
pub async fn remove_user_crowns(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<RemovedResponse>> {
    let removed = state.ledger.remove_all_crowns_for_user(user_id).await?;
    Ok(Json(RemovedResponse { removed }))
}

pub fn crown_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/guilds/:guild_id/crowns",
            get(list_guild_crowns).delete(reset_guild_crowns),
        )
        .route("/api/guilds/:guild_id/crowns/top", get(top_holders))
        .route("/api/guilds/:guild_id/crowns/history", get(crown_history))
        .route("/api/guilds/:guild_id/crowns/seed", post(seed_crowns))
        .route("/api/guilds/:guild_id/crowns/seeded", delete(reset_seeded_crowns))
        .route(
            "/api/guilds/:guild_id/users/:user_id/crowns",
            get(list_member_crowns).delete(remove_member_crowns),
        )
        .route("/api/users/:user_id/crowns", delete(remove_user_crowns))
}
