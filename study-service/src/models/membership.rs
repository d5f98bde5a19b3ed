use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_DAILY_TOKEN_LIMIT: i64 = 1_000_000;
pub const DEFAULT_WEEKLY_TOKEN_LIMIT: i64 = 5_000_000;
pub const DEFAULT_MONTHLY_TOKEN_LIMIT: i64 = 15_000_000;
pub const DEFAULT_MAX_CONCURRENT_CHATS: i32 = 3;

/// Per-user, per-class permission and quota configuration.
///
/// Limits are independent caps, not a rollover hierarchy; a membership is
/// still expected to keep daily <= weekly <= monthly so each window can
/// actually bind.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClassMembership {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub is_manager: bool,
    pub can_chat: bool,
    pub max_concurrent_chats: i32,
    pub is_sponsored: bool,
    pub daily_token_limit: i64,
    pub weekly_token_limit: i64,
    pub monthly_token_limit: i64,
    pub joined_utc: DateTime<Utc>,
}

/// Partial update for a membership. Only the fields listed here can be
/// changed through the API; anything else on the row is off limits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MembershipPatch {
    pub is_manager: Option<bool>,
    pub can_chat: Option<bool>,
    pub max_concurrent_chats: Option<i32>,
    pub is_sponsored: Option<bool>,
    pub daily_token_limit: Option<i64>,
    pub weekly_token_limit: Option<i64>,
    pub monthly_token_limit: Option<i64>,
}

impl MembershipPatch {
    pub fn is_empty(&self) -> bool {
        self.is_manager.is_none()
            && self.can_chat.is_none()
            && self.max_concurrent_chats.is_none()
            && self.is_sponsored.is_none()
            && self.daily_token_limit.is_none()
            && self.weekly_token_limit.is_none()
            && self.monthly_token_limit.is_none()
    }

    /// Validate the patch against the membership it would apply to. Limits
    /// are checked on the merged result so a patch cannot leave the row in
    /// a state where a wider window is smaller than a narrower one.
    pub fn validate_against(&self, current: &ClassMembership) -> Result<(), AppError> {
        if self.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "No updatable fields provided"
            )));
        }

        let daily = self.daily_token_limit.unwrap_or(current.daily_token_limit);
        let weekly = self
            .weekly_token_limit
            .unwrap_or(current.weekly_token_limit);
        let monthly = self
            .monthly_token_limit
            .unwrap_or(current.monthly_token_limit);

        validate_limits(daily, weekly, monthly)?;

        if let Some(max) = self.max_concurrent_chats {
            if max < 1 {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "max_concurrent_chats must be at least 1"
                )));
            }
        }

        Ok(())
    }
}

/// Token limits must be positive and ordered daily <= weekly <= monthly.
pub fn validate_limits(daily: i64, weekly: i64, monthly: i64) -> Result<(), AppError> {
    if daily <= 0 || weekly <= 0 || monthly <= 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Token limits must be positive"
        )));
    }
    if daily > weekly || weekly > monthly {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Token limits must satisfy daily <= weekly <= monthly"
        )));
    }
    Ok(())
}
