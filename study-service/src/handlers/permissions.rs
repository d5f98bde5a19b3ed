use crate::dtos::permissions::{
    EligibilityResponse, SponsorshipRequest, SponsorshipResponse, UpdateLimitsRequest,
    UpdateMembershipRequest,
};
use crate::middleware::UserId;
use crate::models::membership::validate_limits;
use crate::models::MembershipPatch;
use crate::services::ChatEligibility;
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

#[instrument(skip(state), fields(user_id))]
pub async fn list_members(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_manager(&state, user_id.0, class_id).await?;
    let members = state.db.list_members(class_id).await?;
    Ok(Json(members))
}

/// Manager-only partial update of another member's flags and limits. A
/// manager cannot strip their own manager flag; someone else has to.
#[instrument(skip(state, payload), fields(user_id))]
pub async fn update_membership(
    State(state): State<AppState>,
    user_id: UserId,
    Path((class_id, member_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateMembershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_manager(&state, user_id.0, class_id).await?;

    let patch: MembershipPatch = payload.into();

    if member_id == user_id.0 && patch.is_manager == Some(false) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Managers cannot revoke their own manager rights"
        )));
    }

    let current = state
        .db
        .get_membership(member_id, class_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Membership not found")))?;

    patch.validate_against(&current)?;

    let updated = state
        .db
        .update_membership(member_id, class_id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Membership not found")))?;

    Ok(Json(updated))
}

#[instrument(skip(state, payload), fields(user_id))]
pub async fn update_member_limits(
    State(state): State<AppState>,
    user_id: UserId,
    Path((class_id, member_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateLimitsRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    require_manager(&state, user_id.0, class_id).await?;

    validate_limits(
        payload.daily_token_limit,
        payload.weekly_token_limit,
        payload.monthly_token_limit,
    )?;

    let patch = MembershipPatch {
        daily_token_limit: Some(payload.daily_token_limit),
        weekly_token_limit: Some(payload.weekly_token_limit),
        monthly_token_limit: Some(payload.monthly_token_limit),
        ..Default::default()
    };

    let updated = state
        .db
        .update_membership(member_id, class_id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Membership not found")))?;

    Ok(Json(updated))
}

/// Flip sponsorship for every non-manager in the class at once.
#[instrument(skip(state, payload), fields(user_id))]
pub async fn set_class_sponsorship(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
    Json(payload): Json<SponsorshipRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_manager(&state, user_id.0, class_id).await?;

    let updated = state
        .db
        .set_class_sponsorship(class_id, payload.is_sponsored)
        .await?;

    Ok(Json(SponsorshipResponse {
        memberships_updated: updated,
    }))
}

/// Remove a member. Managers can remove anyone but themselves; members can
/// leave on their own.
#[instrument(skip(state), fields(user_id))]
pub async fn remove_member(
    State(state): State<AppState>,
    user_id: UserId,
    Path((class_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    if member_id != user_id.0 {
        require_manager(&state, user_id.0, class_id).await?;
    } else {
        require_member(&state, user_id.0, class_id).await?;
    }

    let removed = state.db.delete_membership(member_id, class_id).await?;
    if !removed {
        return Err(AppError::NotFound(anyhow::anyhow!("Membership not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Would a chat turn be allowed right now? Runs the full gate without
/// sending anything.
#[instrument(skip(state), fields(user_id))]
pub async fn chat_eligibility(
    State(state): State<AppState>,
    user_id: UserId,
    Path(class_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let response = match state
        .quota
        .evaluate_chat_eligibility(user_id.0, class_id)
        .await?
    {
        ChatEligibility::Allowed => EligibilityResponse {
            can_chat: true,
            reason: None,
        },
        ChatEligibility::Denied(reason) => EligibilityResponse {
            can_chat: false,
            reason: Some(reason.user_message().to_string()),
        },
    };

    Ok(Json(response))
}
