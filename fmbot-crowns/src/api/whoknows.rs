//! Leaderboard endpoints
//!
//! `GET /api/guilds/:guild_id/whoknows/{artist,album,track}` and the global
//! artist leaderboard. Responses are rendered by the chat layer.

use crate::services::WhoKnowsResult;
use crate::types::{EntityKey, GuildId};
use crate::{ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ArtistQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseQuery {
    pub artist: String,
    pub name: String,
}

/// GET /api/guilds/:guild_id/whoknows/artist?name=
pub async fn guild_artist(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Query(query): Query<ArtistQuery>,
) -> ApiResult<Json<WhoKnowsResult>> {
    Ok(Json(state.whoknows.artist(guild_id, &query.name).await?))
}

/// GET /api/guilds/:guild_id/whoknows/album?artist=&name=
pub async fn guild_album(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Query(query): Query<ReleaseQuery>,
) -> ApiResult<Json<WhoKnowsResult>> {
    Ok(Json(
        state
            .whoknows
            .album(guild_id, &query.artist, &query.name)
            .await?,
    ))
}

/// GET /api/guilds/:guild_id/whoknows/track?artist=&name=
pub async fn guild_track(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Query(query): Query<ReleaseQuery>,
) -> ApiResult<Json<WhoKnowsResult>> {
    Ok(Json(
        state
            .whoknows
            .track(guild_id, &query.artist, &query.name)
            .await?,
    ))
}

/// GET /api/global/whoknows/artist?name=
pub async fn global_artist(
    State(state): State<AppState>,
    Query(query): Query<ArtistQuery>,
) -> ApiResult<Json<WhoKnowsResult>> {
    Ok(Json(
        state.whoknows.global(EntityKey::artist(query.name)).await?,
    ))
}

pub fn whoknows_routes() -> Router<AppState> {
    Router::new()
        .route("/api/guilds/:guild_id/whoknows/artist", get(guild_artist))
        .route("/api/guilds/:guild_id/whoknows/album", get(guild_album))
        .route("/api/guilds/:guild_id/whoknows/track", get(guild_track))
        .route("/api/global/whoknows/artist", get(global_artist))
}
