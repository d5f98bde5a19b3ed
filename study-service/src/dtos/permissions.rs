use crate::models::MembershipPatch;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Allow-listed membership update. Unknown fields are rejected outright so a
/// typo cannot silently change nothing.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMembershipRequest {
    pub is_manager: Option<bool>,
    pub can_chat: Option<bool>,
    pub max_concurrent_chats: Option<i32>,
    pub is_sponsored: Option<bool>,
    pub daily_token_limit: Option<i64>,
    pub weekly_token_limit: Option<i64>,
    pub monthly_token_limit: Option<i64>,
}

impl From<UpdateMembershipRequest> for MembershipPatch {
    fn from(req: UpdateMembershipRequest) -> Self {
        MembershipPatch {
            is_manager: req.is_manager,
            can_chat: req.can_chat,
            max_concurrent_chats: req.max_concurrent_chats,
            is_sponsored: req.is_sponsored,
            daily_token_limit: req.daily_token_limit,
            weekly_token_limit: req.weekly_token_limit,
            monthly_token_limit: req.monthly_token_limit,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLimitsRequest {
    #[validate(range(min = 1))]
    pub daily_token_limit: i64,
    #[validate(range(min = 1))]
    pub weekly_token_limit: i64,
    #[validate(range(min = 1))]
    pub monthly_token_limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct SponsorshipRequest {
    pub is_sponsored: bool,
}

#[derive(Debug, Serialize)]
pub struct SponsorshipResponse {
    pub memberships_updated: u64,
}

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub can_chat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
