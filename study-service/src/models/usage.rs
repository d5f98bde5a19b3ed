use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only billing ledger row, one per completed chat turn. Carries no
/// foreign keys so the audit trail survives class and session deletion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub record_id: Uuid,
    pub user_id: Uuid,
    pub billed_to_user_id: Uuid,
    pub class_id: Uuid,
    pub session_id: Option<Uuid>,
    pub model_name: String,
    pub operation_type: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost: Decimal,
    pub is_sponsored: bool,
    pub is_overflow: bool,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordUsage {
    pub user_id: Uuid,
    pub billed_to_user_id: Uuid,
    pub class_id: Uuid,
    pub session_id: Option<Uuid>,
    pub model_name: String,
    pub operation_type: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: Decimal,
    pub is_sponsored: bool,
    pub is_overflow: bool,
}

/// Fresh per-window usage for one member, computed after pending resets.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub class_id: Uuid,
    pub daily_tokens_used: i64,
    pub daily_token_limit: i64,
    pub daily_tokens_remaining: i64,
    pub weekly_tokens_used: i64,
    pub weekly_token_limit: i64,
    pub weekly_tokens_remaining: i64,
    pub monthly_tokens_used: i64,
    pub monthly_token_limit: i64,
    pub monthly_tokens_remaining: i64,
}

impl UsageStats {
    pub fn from_parts(
        membership: &super::ClassMembership,
        tracker: &super::UsageTracker,
    ) -> Self {
        UsageStats {
            class_id: membership.class_id,
            daily_tokens_used: tracker.daily_tokens_used,
            daily_token_limit: membership.daily_token_limit,
            daily_tokens_remaining: (membership.daily_token_limit - tracker.daily_tokens_used)
                .max(0),
            weekly_tokens_used: tracker.weekly_tokens_used,
            weekly_token_limit: membership.weekly_token_limit,
            weekly_tokens_remaining: (membership.weekly_token_limit - tracker.weekly_tokens_used)
                .max(0),
            monthly_tokens_used: tracker.monthly_tokens_used,
            monthly_token_limit: membership.monthly_token_limit,
            monthly_tokens_remaining: (membership.monthly_token_limit
                - tracker.monthly_tokens_used)
                .max(0),
        }
    }
}
