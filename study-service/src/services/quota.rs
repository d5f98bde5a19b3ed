//! Quota engine: lazy window resets, chat eligibility gating, and token
//! commits, all serialized through row locks on the tracker.

use crate::config::BillingZone;
use crate::models::{ChatSession, ClassMembership, UsageTracker};
use crate::services::database::Database;
use crate::services::metrics;
use chrono::{Local, NaiveDate, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Why a chat turn or session was refused. Ordered: the gate checks
/// membership, then the chat flag, then the windows narrowest first, then
/// concurrency, and reports the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NotEnrolled,
    ChatDisabled,
    DailyLimit,
    WeeklyLimit,
    MonthlyLimit,
    ConcurrencyLimit,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::NotEnrolled => "not_enrolled",
            DenialReason::ChatDisabled => "chat_disabled",
            DenialReason::DailyLimit => "daily_limit",
            DenialReason::WeeklyLimit => "weekly_limit",
            DenialReason::MonthlyLimit => "monthly_limit",
            DenialReason::ConcurrencyLimit => "concurrency_limit",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            DenialReason::NotEnrolled => "You are not a member of this class",
            DenialReason::ChatDisabled => "Chat is disabled for your membership",
            DenialReason::DailyLimit => "Daily token limit reached",
            DenialReason::WeeklyLimit => "Weekly token limit reached",
            DenialReason::MonthlyLimit => "Monthly token limit reached",
            DenialReason::ConcurrencyLimit => "Too many active chat sessions",
        }
    }
}

impl From<DenialReason> for AppError {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::NotEnrolled | DenialReason::ChatDisabled => {
                AppError::Forbidden(anyhow::anyhow!(reason.user_message()))
            }
            _ => AppError::TooManyRequests(reason.user_message().to_string(), None),
        }
    }
}

/// Gate verdict for a prospective chat turn or session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEligibility {
    Allowed,
    Denied(DenialReason),
}

impl ChatEligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ChatEligibility::Allowed)
    }
}

/// Source of "today" for window boundaries. All reset decisions go through
/// this so the billing calendar is configured in exactly one place.
#[derive(Debug, Clone, Copy)]
pub struct BillingClock {
    zone: BillingZone,
}

impl BillingClock {
    pub fn new(zone: BillingZone) -> Self {
        Self { zone }
    }

    pub fn server_local() -> Self {
        Self {
            zone: BillingZone::ServerLocal,
        }
    }

    pub fn today(&self) -> NaiveDate {
        match self.zone {
            BillingZone::Named(tz) => Utc::now().with_timezone(&tz).date_naive(),
            BillingZone::ServerLocal => Local::now().date_naive(),
        }
    }
}

/// First window whose counter has reached its limit, in narrowest-first
/// order. Assumes pending resets have already been applied.
pub fn exceeded_window(
    membership: &ClassMembership,
    tracker: &UsageTracker,
) -> Option<DenialReason> {
    if tracker.daily_tokens_used >= membership.daily_token_limit {
        Some(DenialReason::DailyLimit)
    } else if tracker.weekly_tokens_used >= membership.weekly_token_limit {
        Some(DenialReason::WeeklyLimit)
    } else if tracker.monthly_tokens_used >= membership.monthly_token_limit {
        Some(DenialReason::MonthlyLimit)
    } else {
        None
    }
}

#[derive(Clone)]
pub struct QuotaEngine {
    db: Arc<Database>,
    clock: BillingClock,
}

impl QuotaEngine {
    pub fn new(db: Arc<Database>, clock: BillingClock) -> Self {
        Self { db, clock }
    }

    /// Run the full pre-turn gate: membership, chat flag, quota windows,
    /// then concurrency. Applies pending resets (and persists them) as a
    /// side effect, so a denial is always judged against fresh counters.
    #[instrument(skip(self))]
    pub async fn evaluate_chat_eligibility(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<ChatEligibility, AppError> {
        let membership = match self.db.get_membership(user_id, class_id).await? {
            Some(m) => m,
            None => return Ok(self.deny(class_id, DenialReason::NotEnrolled)),
        };

        if !membership.can_chat {
            return Ok(self.deny(class_id, DenialReason::ChatDisabled));
        }

        let tracker = self.refreshed_tracker(user_id, class_id).await?;
        if let Some(reason) = exceeded_window(&membership, &tracker) {
            return Ok(self.deny(class_id, reason));
        }

        let mut conn = self.db.pool().acquire().await.map_err(acquire_err)?;
        let active = Database::count_active_sessions(&mut *conn, user_id, class_id).await?;
        if active >= membership.max_concurrent_chats as i64 {
            return Ok(self.deny(class_id, DenialReason::ConcurrencyLimit));
        }

        Ok(ChatEligibility::Allowed)
    }

    /// Add a completed turn's tokens to all three windows. Resets are
    /// applied first so the spend lands in the current windows. The tracker
    /// row lock serializes this against concurrent gates and commits.
    #[instrument(skip(self))]
    pub async fn commit_token_usage(
        &self,
        user_id: Uuid,
        class_id: Uuid,
        tokens: i64,
    ) -> Result<UsageTracker, AppError> {
        let today = self.clock.today();

        let mut tx = self.db.pool().begin().await.map_err(acquire_err)?;
        let mut tracker =
            Database::fetch_or_create_tracker(&mut *tx, user_id, class_id, today).await?;
        tracker.apply_pending_resets(today);
        tracker.add_tokens(tokens);
        Database::store_tracker(&mut *tx, &tracker).await?;
        tx.commit().await.map_err(acquire_err)?;

        metrics::record_tokens_committed(&class_id.to_string(), tokens);
        info!(
            user_id = %user_id,
            class_id = %class_id,
            tokens = tokens,
            daily = tracker.daily_tokens_used,
            "Committed token usage"
        );

        Ok(tracker)
    }

    /// Fresh tracker state with pending resets applied and persisted.
    #[instrument(skip(self))]
    pub async fn refreshed_tracker(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<UsageTracker, AppError> {
        let today = self.clock.today();

        let mut tx = self.db.pool().begin().await.map_err(acquire_err)?;
        let mut tracker =
            Database::fetch_or_create_tracker(&mut *tx, user_id, class_id, today).await?;
        if tracker.apply_pending_resets(today) {
            Database::store_tracker(&mut *tx, &tracker).await?;
        }
        tx.commit().await.map_err(acquire_err)?;

        Ok(tracker)
    }

    /// Create a session if the member may open one. The gate and the insert
    /// run in a single transaction with the membership row locked, so two
    /// racing requests cannot both slip under the concurrency cap.
    #[instrument(skip(self, title))]
    pub async fn reserve_session(
        &self,
        user_id: Uuid,
        class_id: Uuid,
        title: &str,
    ) -> Result<Result<ChatSession, DenialReason>, AppError> {
        let today = self.clock.today();

        let mut tx = self.db.pool().begin().await.map_err(acquire_err)?;

        let membership =
            match Database::get_membership_for_update(&mut *tx, user_id, class_id).await? {
                Some(m) => m,
                None => return Ok(Err(self.denied(class_id, DenialReason::NotEnrolled))),
            };

        if !membership.can_chat {
            return Ok(Err(self.denied(class_id, DenialReason::ChatDisabled)));
        }

        let mut tracker =
            Database::fetch_or_create_tracker(&mut *tx, user_id, class_id, today).await?;
        if tracker.apply_pending_resets(today) {
            Database::store_tracker(&mut *tx, &tracker).await?;
        }
        // Denials past this point commit first: lazily-applied resets must
        // survive a refusal, same as in evaluate_chat_eligibility.
        if let Some(reason) = exceeded_window(&membership, &tracker) {
            tx.commit().await.map_err(acquire_err)?;
            return Ok(Err(self.denied(class_id, reason)));
        }

        let active = Database::count_active_sessions(&mut *tx, user_id, class_id).await?;
        if active >= membership.max_concurrent_chats as i64 {
            tx.commit().await.map_err(acquire_err)?;
            return Ok(Err(self.denied(class_id, DenialReason::ConcurrencyLimit)));
        }

        let session = Database::insert_session(&mut *tx, user_id, class_id, title).await?;
        tx.commit().await.map_err(acquire_err)?;

        info!(
            user_id = %user_id,
            class_id = %class_id,
            session_id = %session.session_id,
            "Reserved chat session"
        );

        Ok(Ok(session))
    }

    fn deny(&self, class_id: Uuid, reason: DenialReason) -> ChatEligibility {
        ChatEligibility::Denied(self.denied(class_id, reason))
    }

    fn denied(&self, class_id: Uuid, reason: DenialReason) -> DenialReason {
        warn!(class_id = %class_id, reason = reason.as_str(), "Chat gate denied");
        metrics::record_gate_denial(&class_id.to_string(), reason.as_str());
        reason
    }
}

fn acquire_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn membership(daily: i64, weekly: i64, monthly: i64) -> ClassMembership {
        ClassMembership {
            membership_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            is_manager: false,
            can_chat: true,
            max_concurrent_chats: 3,
            is_sponsored: false,
            daily_token_limit: daily,
            weekly_token_limit: weekly,
            monthly_token_limit: monthly,
            joined_utc: Utc::now(),
        }
    }

    fn tracker(daily: i64, weekly: i64, monthly: i64) -> UsageTracker {
        let today = NaiveDate::from_ymd_opt(2025, 9, 3).unwrap();
        UsageTracker {
            tracker_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            daily_tokens_used: daily,
            weekly_tokens_used: weekly,
            monthly_tokens_used: monthly,
            last_daily_reset: today,
            last_weekly_reset: today,
            last_monthly_reset: today,
        }
    }

    #[test]
    fn under_every_limit_passes() {
        let m = membership(1_000, 5_000, 15_000);
        assert_eq!(exceeded_window(&m, &tracker(999, 4_999, 14_999)), None);
    }

    #[test]
    fn at_the_limit_is_exceeded() {
        let m = membership(1_000, 5_000, 15_000);
        assert_eq!(
            exceeded_window(&m, &tracker(1_000, 1_000, 1_000)),
            Some(DenialReason::DailyLimit)
        );
    }

    #[test]
    fn narrowest_window_wins_when_several_are_over() {
        let m = membership(1_000, 5_000, 15_000);
        assert_eq!(
            exceeded_window(&m, &tracker(1_500, 6_000, 16_000)),
            Some(DenialReason::DailyLimit)
        );
        assert_eq!(
            exceeded_window(&m, &tracker(0, 6_000, 16_000)),
            Some(DenialReason::WeeklyLimit)
        );
        assert_eq!(
            exceeded_window(&m, &tracker(0, 0, 16_000)),
            Some(DenialReason::MonthlyLimit)
        );
    }

    #[test]
    fn membership_denials_map_to_forbidden() {
        let err: AppError = DenialReason::ChatDisabled.into();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err: AppError = DenialReason::NotEnrolled.into();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn quota_denials_map_to_too_many_requests() {
        for reason in [
            DenialReason::DailyLimit,
            DenialReason::WeeklyLimit,
            DenialReason::MonthlyLimit,
            DenialReason::ConcurrencyLimit,
        ] {
            let err: AppError = reason.into();
            assert!(matches!(err, AppError::TooManyRequests(_, _)));
        }
    }
}
