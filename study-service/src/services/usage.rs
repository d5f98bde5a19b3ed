//! Usage reporting: fresh per-window stats for members and managers.

use crate::models::{UsageStats, UsageTracker};
use crate::services::database::Database;
use crate::services::quota::QuotaEngine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// One member's row in a class-wide usage overview.
#[derive(Debug, Clone, Serialize)]
pub struct MemberUsage {
    pub user_id: Uuid,
    pub is_manager: bool,
    pub is_sponsored: bool,
    pub can_chat: bool,
    pub usage: UsageStats,
    pub last_activity_utc: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct UsageReportingService {
    db: Arc<Database>,
    quota: QuotaEngine,
}

impl UsageReportingService {
    pub fn new(db: Arc<Database>, quota: QuotaEngine) -> Self {
        Self { db, quota }
    }

    /// Fresh stats for one member of one class. Reading usage applies
    /// pending resets first, so a stale counter is never reported.
    #[instrument(skip(self))]
    pub async fn user_usage(&self, user_id: Uuid, class_id: Uuid) -> Result<UsageStats, AppError> {
        let membership = self
            .db
            .get_membership(user_id, class_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Not a member of this class")))?;

        let tracker = self.quota.refreshed_tracker(user_id, class_id).await?;
        Ok(UsageStats::from_parts(&membership, &tracker))
    }

    /// Stats across every class the user belongs to.
    #[instrument(skip(self))]
    pub async fn user_usage_all_classes(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UsageStats>, AppError> {
        let classes = self.db.list_user_classes(user_id).await?;

        let mut stats = Vec::with_capacity(classes.len());
        for class in classes {
            stats.push(self.user_usage(user_id, class.class_id).await?);
        }
        Ok(stats)
    }

    /// Manager view: every member's fresh usage plus their last completed
    /// turn.
    #[instrument(skip(self))]
    pub async fn class_overview(&self, class_id: Uuid) -> Result<Vec<MemberUsage>, AppError> {
        let members = self.db.list_members(class_id).await?;

        let mut overview = Vec::with_capacity(members.len());
        for membership in members {
            let tracker: UsageTracker = self
                .quota
                .refreshed_tracker(membership.user_id, class_id)
                .await?;
            let last_activity = self.db.last_activity(membership.user_id, class_id).await?;

            overview.push(MemberUsage {
                user_id: membership.user_id,
                is_manager: membership.is_manager,
                is_sponsored: membership.is_sponsored,
                can_chat: membership.can_chat,
                usage: UsageStats::from_parts(&membership, &tracker),
                last_activity_utc: last_activity,
            });
        }
        Ok(overview)
    }
}
