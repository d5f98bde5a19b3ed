pub mod chat;
pub mod classes;
pub mod documents;
pub mod health;
pub mod permissions;
pub mod usage;

use crate::models::ClassMembership;
use crate::startup::AppState;
use service_core::error::AppError;
use uuid::Uuid;

/// Load the caller's membership, requiring manager rights.
pub(crate) async fn require_manager(
    state: &AppState,
    user_id: Uuid,
    class_id: Uuid,
) -> Result<ClassMembership, AppError> {
    let membership = state
        .db
        .get_membership(user_id, class_id)
        .await?
        .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("Not a member of this class")))?;

    if !membership.is_manager {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Manager rights required"
        )));
    }

    Ok(membership)
}

/// Load the caller's membership, requiring enrollment only.
pub(crate) async fn require_member(
    state: &AppState,
    user_id: Uuid,
    class_id: Uuid,
) -> Result<ClassMembership, AppError> {
    state
        .db
        .get_membership(user_id, class_id)
        .await?
        .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("Not a member of this class")))
}
