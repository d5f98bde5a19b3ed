use crate::middleware::UserId;
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;

use super::{require_manager, require_member};

/// The caller's fresh usage in every class they belong to.
#[instrument(skip(state), fields(user_id))]
pub async fn my_usage(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.usage.user_usage_all_classes(user_id.0).await?;
    Ok(Json(stats))
}

/// The caller's fresh usage in one class.
#[instrument(skip(state), fields(user_id))]
pub async fn my_class_usage(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.usage.user_usage(user_id.0, class_id).await?;
    Ok(Json(stats))
}

/// Manager view of every member's usage and last activity.
#[instrument(skip(state), fields(user_id))]
pub async fn class_usage_overview(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_manager(&state, user_id.0, class_id).await?;
    let overview = state.usage.class_overview(class_id).await?;
    Ok(Json(overview))
}

/// The caller's ledger entries for one class.
#[instrument(skip(state), fields(user_id))]
pub async fn my_usage_records(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_member(&state, user_id.0, class_id).await?;
    let records = state.db.list_usage_records(user_id.0, class_id).await?;
    Ok(Json(records))
}
