use crate::dtos::classes::{
    ClassResponse, CreateClassRequest, JoinClassRequest, UpdateClassRequest,
};
use crate::middleware::UserId;
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::{require_manager, require_member};

#[instrument(skip(state, payload), fields(user_id))]
pub async fn create_class(
    State(state): State<AppState>,
    user_id: UserId,
    Json(payload): Json<CreateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let class = state
        .db
        .create_class(user_id.0, &payload.name, payload.description.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(class)))
}

#[instrument(skip(state), fields(user_id))]
pub async fn list_classes(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    let classes = state.db.list_user_classes(user_id.0).await?;
    Ok(Json(classes))
}

#[instrument(skip(state), fields(user_id))]
pub async fn get_class(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_member(&state, user_id.0, class_id).await?;

    let class = state
        .db
        .get_class(class_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Class not found")))?;
    let (member_count, session_count, document_count) = state.db.class_counts(class_id).await?;

    Ok(Json(ClassResponse {
        class,
        member_count,
        session_count,
        document_count,
    }))
}

#[instrument(skip(state, payload), fields(user_id))]
pub async fn update_class(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
    Json(payload): Json<UpdateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    require_manager(&state, user_id.0, class_id).await?;

    let class = state
        .db
        .update_class(class_id, payload.name.as_deref(), payload.description.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Class not found")))?;

    Ok(Json(class))
}

/// Only the owner may delete a class. Ledger rows survive the cascade.
#[instrument(skip(state), fields(user_id))]
pub async fn delete_class(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let class = state
        .db
        .get_class(class_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Class not found")))?;

    if class.owner_id != user_id.0 {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only the class owner can delete a class"
        )));
    }

    state.db.delete_class(class_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload), fields(user_id))]
pub async fn join_class(
    State(state): State<AppState>,
    user_id: UserId,
    Json(payload): Json<JoinClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let class = state
        .db
        .find_class_by_code(&payload.class_code.to_uppercase())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No class with that code")))?;

    let membership = state.db.create_membership(user_id.0, class.class_id).await?;

    Ok((StatusCode::CREATED, Json(membership)))
}
