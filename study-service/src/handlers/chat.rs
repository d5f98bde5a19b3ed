use crate::dtos::chat::{ChatTurnResponse, CreateSessionRequest, SendMessageRequest};
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

use super::require_member;

#[instrument(skip(state, payload), fields(user_id))]
pub async fn create_session(
    State(state): State<AppState>,
    user_id: UserId,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let session = state
        .chat
        .create_session(user_id.0, payload.class_id, &payload.title)
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

#[instrument(skip(state), fields(user_id))]
pub async fn list_sessions(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_member(&state, user_id.0, class_id).await?;
    let sessions = state.db.list_sessions(user_id.0, class_id).await?;
    Ok(Json(sessions))
}

#[instrument(skip(state, payload), fields(user_id))]
pub async fn send_message(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let turn = state
        .chat
        .send_message(user_id.0, session_id, &payload.content)
        .await?;

    Ok(Json(ChatTurnResponse::from(turn)))
}

#[instrument(skip(state), fields(user_id))]
pub async fn list_messages(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .db
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Session not found")))?;

    if session.user_id != user_id.0 {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Session belongs to another user"
        )));
    }

    let messages = state.db.list_messages(session_id).await?;
    Ok(Json(messages))
}

/// Close a session and release its concurrency slot.
#[instrument(skip(state), fields(user_id))]
pub async fn close_session(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .db
        .close_session(session_id, user_id.0)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Session not found")))?;

    Ok(Json(session))
}
