use crate::dtos::documents::RegisterDocumentRequest;
use crate::middleware::UserId;
use crate::models::ProcessingStatus;
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

/// Register document text for chat context. A document arriving with its
/// extracted text is immediately completed; one without is pending until an
/// upstream extractor fills it in.
#[instrument(skip(state, payload), fields(user_id))]
pub async fn register_document(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
    Json(payload): Json<RegisterDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    require_member(&state, user_id.0, class_id).await?;

    if let Some(session_id) = payload.session_id {
        let session = state
            .db
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Session not found")))?;
        if session.class_id != class_id {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Session does not belong to this class"
            )));
        }
    }

    let status = if payload.extracted_text.is_some() {
        ProcessingStatus::Completed
    } else {
        ProcessingStatus::Pending
    };

    let document = state
        .db
        .create_document(
            class_id,
            payload.session_id,
            user_id.0,
            &payload.title,
            payload.source_url.as_deref(),
            payload.extracted_text.as_deref(),
            status,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(document)))
}

#[instrument(skip(state), fields(user_id))]
pub async fn list_documents(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_member(&state, user_id.0, class_id).await?;
    let documents = state.db.list_documents(class_id).await?;
    Ok(Json(documents))
}
