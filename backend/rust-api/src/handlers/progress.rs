use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::ProgressError;
use crate::extractors::{AppJson, MaybeUser};
use crate::middlewares::auth::JwtClaims;
use crate::models::progress::{ReadFault, SubmissionResult, SubmitExerciseRequest};
use crate::services::AppState;

/// POST /api/v1/progress/exercises
pub async fn submit_exercise(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(payload): AppJson<SubmitExerciseRequest>,
) -> Result<Json<SubmissionResult>, ProgressError> {
    payload.validate()?;

    let result = state.submissions.submit(&claims.sub, &payload).await?;
    Ok(Json(result))
}

/// GET /api/v1/progress/parts/{part_id}
pub async fn get_part_progress(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    Path(part_id): Path<String>,
) -> impl IntoResponse {
    let progress = state.reader.part_progress(user.user_id(), &part_id).await;
    let status = progress.error.map_or(StatusCode::OK, fault_status);
    (status, Json(progress))
}

/// GET /api/v1/progress/dashboard
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
) -> impl IntoResponse {
    Json(state.reader.dashboard(user.user_id()).await)
}

/// GET /api/v1/progress/exercises/{exercise_id}
pub async fn get_exercise_status(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    Path(exercise_id): Path<String>,
) -> impl IntoResponse {
    let status = state.reader.exercise_status(user.user_id(), &exercise_id).await;
    let code = status.error.map_or(StatusCode::OK, fault_status);
    (code, Json(status))
}

fn fault_status(fault: ReadFault) -> StatusCode {
    match fault {
        ReadFault::PartNotFound => StatusCode::NOT_FOUND,
        ReadFault::ServerError | ReadFault::StatusUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
