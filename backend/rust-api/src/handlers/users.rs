use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::error::ProgressError;
use crate::middlewares::auth::JwtClaims;
use crate::models::user::{LeaderboardEntry, TreeView, UserStats};
use crate::services::AppState;

/// GET /api/v1/users/me/stats
pub async fn get_my_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<UserStats>, ProgressError> {
    Ok(Json(state.standings.stats(&claims.sub).await?))
}

/// GET /api/v1/users/me/tree
pub async fn get_my_tree(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<TreeView>, ProgressError> {
    Ok(Json(state.standings.tree(&claims.sub).await?))
}

/// GET /api/v1/leaderboard
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LeaderboardEntry>>, ProgressError> {
    Ok(Json(state.standings.leaderboard().await?))
}
