use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Rolling token counters for one user in one class.
///
/// The three windows are independent: each has its own counter and its own
/// reset watermark, and a commit lands in all three at once. Resets are
/// lazy; nothing rolls a window over until the tracker is next touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UsageTracker {
    pub tracker_id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub daily_tokens_used: i64,
    pub weekly_tokens_used: i64,
    pub monthly_tokens_used: i64,
    pub last_daily_reset: NaiveDate,
    pub last_weekly_reset: NaiveDate,
    pub last_monthly_reset: NaiveDate,
}

impl UsageTracker {
    /// Zero any counter whose window has rolled over since its watermark.
    /// Idempotent within a billing day: the watermarks advance to `today`,
    /// so a second call is a no-op. Returns whether anything changed.
    pub fn apply_pending_resets(&mut self, today: NaiveDate) -> bool {
        let mut changed = false;

        if self.last_daily_reset != today {
            self.daily_tokens_used = 0;
            self.last_daily_reset = today;
            changed = true;
        }

        if week_monday(self.last_weekly_reset) != week_monday(today) {
            self.weekly_tokens_used = 0;
            self.last_weekly_reset = today;
            changed = true;
        }

        if !same_month(self.last_monthly_reset, today) {
            self.monthly_tokens_used = 0;
            self.last_monthly_reset = today;
            changed = true;
        }

        changed
    }

    /// Add a completed turn's tokens to every window. Counters may overshoot
    /// their limits; the gate only checks them before the next turn.
    pub fn add_tokens(&mut self, tokens: i64) {
        self.daily_tokens_used += tokens;
        self.weekly_tokens_used += tokens;
        self.monthly_tokens_used += tokens;
    }
}

/// Monday of the ISO week containing `date`.
pub fn week_monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tracker(daily: i64, weekly: i64, monthly: i64, watermark: NaiveDate) -> UsageTracker {
        UsageTracker {
            tracker_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            daily_tokens_used: daily,
            weekly_tokens_used: weekly,
            monthly_tokens_used: monthly,
            last_daily_reset: watermark,
            last_weekly_reset: watermark,
            last_monthly_reset: watermark,
        }
    }

    #[test]
    fn week_monday_is_stable_across_the_week() {
        let monday = date(2025, 9, 1);
        for offset in 0..7 {
            assert_eq!(week_monday(monday + Duration::days(offset)), monday);
        }
        assert_eq!(week_monday(date(2025, 8, 31)), date(2025, 8, 25));
    }

    #[test]
    fn daily_rollover_leaves_other_windows_alone() {
        // Tuesday to Wednesday, same week and month.
        let mut t = tracker(500, 2_000, 9_000, date(2025, 9, 2));
        let changed = t.apply_pending_resets(date(2025, 9, 3));

        assert!(changed);
        assert_eq!(t.daily_tokens_used, 0);
        assert_eq!(t.weekly_tokens_used, 2_000);
        assert_eq!(t.monthly_tokens_used, 9_000);
        assert_eq!(t.last_daily_reset, date(2025, 9, 3));
    }

    #[test]
    fn week_boundary_resets_daily_and_weekly() {
        // Sunday Sep 7 to Monday Sep 8: new day, new week, same month.
        let mut t = tracker(500, 2_000, 9_000, date(2025, 9, 7));
        t.apply_pending_resets(date(2025, 9, 8));

        assert_eq!(t.daily_tokens_used, 0);
        assert_eq!(t.weekly_tokens_used, 0);
        assert_eq!(t.monthly_tokens_used, 9_000);
    }

    #[test]
    fn month_boundary_mid_week_spares_the_weekly_counter() {
        // Sep 30 2025 is a Tuesday, Oct 1 a Wednesday: same ISO week, new
        // day and new month.
        let mut t = tracker(500, 2_000, 9_000, date(2025, 9, 30));
        t.apply_pending_resets(date(2025, 10, 1));

        assert_eq!(t.daily_tokens_used, 0);
        assert_eq!(t.weekly_tokens_used, 2_000);
        assert_eq!(t.monthly_tokens_used, 0);
    }

    #[test]
    fn reset_is_idempotent_within_a_day() {
        let mut t = tracker(500, 2_000, 9_000, date(2025, 9, 2));
        t.apply_pending_resets(date(2025, 9, 10));
        let snapshot = t.clone();

        let changed = t.apply_pending_resets(date(2025, 9, 10));
        assert!(!changed);
        assert_eq!(t, snapshot);
    }

    #[test]
    fn long_gap_resets_everything() {
        let mut t = tracker(500, 2_000, 9_000, date(2025, 6, 15));
        t.apply_pending_resets(date(2025, 9, 10));

        assert_eq!(t.daily_tokens_used, 0);
        assert_eq!(t.weekly_tokens_used, 0);
        assert_eq!(t.monthly_tokens_used, 0);
    }

    #[test]
    fn commit_lands_in_all_three_windows() {
        let mut t = tracker(100, 200, 300, date(2025, 9, 2));
        t.add_tokens(50);

        assert_eq!(t.daily_tokens_used, 150);
        assert_eq!(t.weekly_tokens_used, 250);
        assert_eq!(t.monthly_tokens_used, 350);
    }
}
