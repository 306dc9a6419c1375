//! Global abuse filter flags

use crate::db::filtered_users::list_filtered_users;
use crate::types::AbuseFilterRecord;
use crate::{ApiResult, AppState};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct FilteredUsersResponse {
    pub users: Vec<AbuseFilterRecord>,
}

/// GET /api/filtered-users
pub async fn filtered_users(
    State(state): State<AppState>,
) -> ApiResult<Json<FilteredUsersResponse>> {
    let users = list_filtered_users(&state.db).await?;
    Ok(Json(FilteredUsersResponse { users }))
}

pub fn filtered_user_routes() -> Router<AppState> {
    Router::new().route("/api/filtered-users", get(filtered_users))
}
