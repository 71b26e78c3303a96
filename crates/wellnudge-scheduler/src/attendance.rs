//! Per-user, per-day attendance flags.
//!
//! State moves forward only within a day: unset → checked in → checked out.
//! Every read and write goes through one mutex, so check-then-mark from
//! overlapping triggers cannot double count.

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use wellnudge_core::config::AttendanceConfig;
use wellnudge_core::time::{local_date, offset_hours};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceDailyStatus {
    pub checked_in: bool,
    pub checked_out: bool,
}

/// Half-open local-hour window `[start, end)`.
#[derive(Debug, Clone, Copy)]
struct HourWindow {
    start: u32,
    end: u32,
}

impl HourWindow {
    fn contains(&self, hour: u32) -> bool {
        self.start <= hour && hour < self.end
    }
}

pub struct AttendanceStateStore {
    days: Mutex<HashMap<NaiveDate, HashMap<String, AttendanceDailyStatus>>>,
    check_in: HourWindow,
    check_out: HourWindow,
    offset: FixedOffset,
}

impl AttendanceStateStore {
    pub fn new(config: &AttendanceConfig) -> Self {
        Self {
            days: Mutex::new(HashMap::new()),
            check_in: HourWindow {
                start: config.check_in_start_hour,
                end: config.check_in_end_hour,
            },
            check_out: HourWindow {
                start: config.check_out_start_hour,
                end: config.check_out_end_hour,
            },
            offset: offset_hours(config.utc_offset_hours),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local business day for an instant.
    pub fn today_at(&self, now: DateTime<Utc>) -> NaiveDate {
        local_date(now, self.offset)
    }

    fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.offset).hour()
    }

    pub async fn should_check_in(&self, user_id: &str) -> bool {
        self.should_check_in_at(user_id, Utc::now()).await
    }

    /// Inside the check-in window and not yet checked in today.
    pub async fn should_check_in_at(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let today = self.today_at(now);
        let mut days = self.days.lock().await;
        let status = days
            .entry(today)
            .or_default()
            .entry(user_id.to_string())
            .or_default();
        self.check_in.contains(self.local_hour(now)) && !status.checked_in
    }

    pub async fn should_check_out(&self, user_id: &str) -> bool {
        self.should_check_out_at(user_id, Utc::now()).await
    }

    /// Inside the check-out window, checked in, not yet checked out.
    pub async fn should_check_out_at(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let today = self.today_at(now);
        let mut days = self.days.lock().await;
        let status = days
            .entry(today)
            .or_default()
            .entry(user_id.to_string())
            .or_default();
        self.check_out.contains(self.local_hour(now)) && status.checked_in && !status.checked_out
    }

    pub async fn mark_checked_in(&self, user_id: &str) -> bool {
        self.mark_checked_in_at(user_id, Utc::now()).await
    }

    /// Returns true if this call moved the user forward.
    pub async fn mark_checked_in_at(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let today = self.today_at(now);
        let mut days = self.days.lock().await;
        let status = days
            .entry(today)
            .or_default()
            .entry(user_id.to_string())
            .or_default();
        if status.checked_in {
            return false;
        }
        status.checked_in = true;
        true
    }

    pub async fn mark_checked_out(&self, user_id: &str) -> bool {
        self.mark_checked_out_at(user_id, Utc::now()).await
    }

    /// No-op unless already checked in today.
    pub async fn mark_checked_out_at(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let today = self.today_at(now);
        let mut days = self.days.lock().await;
        let Some(status) = days.get_mut(&today).and_then(|d| d.get_mut(user_id)) else {
            return false;
        };
        if !status.checked_in || status.checked_out {
            return false;
        }
        status.checked_out = true;
        true
    }

    pub async fn status(&self, user_id: &str) -> AttendanceDailyStatus {
        self.status_at(user_id, Utc::now()).await
    }

    pub async fn status_at(&self, user_id: &str, now: DateTime<Utc>) -> AttendanceDailyStatus {
        let today = self.today_at(now);
        let days = self.days.lock().await;
        days.get(&today)
            .and_then(|d| d.get(user_id))
            .copied()
            .unwrap_or_default()
    }

    /// Users checked in and not yet out, sorted.
    pub async fn online_users_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let today = self.today_at(now);
        let days = self.days.lock().await;
        let mut users: Vec<String> = days
            .get(&today)
            .map(|d| {
                d.iter()
                    .filter(|(_, s)| s.checked_in && !s.checked_out)
                    .map(|(u, _)| u.clone())
                    .collect()
            })
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Drop every day that is not today. Returns the number of days removed.
    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let today = self.today_at(now);
        let mut days = self.days.lock().await;
        let before = days.len();
        days.retain(|d, _| *d == today);
        let removed = before - days.len();
        if removed > 0 {
            tracing::info!("🧹 Attendance cleanup: dropped {removed} old day(s)");
        }
        removed
    }

    pub async fn tracked_days(&self) -> usize {
        self.days.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn store() -> AttendanceStateStore {
        AttendanceStateStore::new(&AttendanceConfig::default())
    }

    /// Local (UTC+8) wall-clock time on 2026-03-02.
    fn local(h: u32, m: u32) -> DateTime<Utc> {
        offset_hours(8)
            .with_ymd_and_hms(2026, 3, 2, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_wall_clock_marks() {
        let s = store();
        assert!(s.mark_checked_in("u1").await);
        assert!(!s.mark_checked_in("u1").await);
        assert!(!s.should_check_in("u1").await);
        assert!(s.mark_checked_out("u1").await);
        assert!(!s.should_check_out("u1").await);
        let st = s.status("u1").await;
        assert!(st.checked_in && st.checked_out);
    }

    #[tokio::test]
    async fn test_check_in_window() {
        let s = store();
        assert!(!s.should_check_in_at("u1", local(7, 59)).await);
        assert!(s.should_check_in_at("u1", local(8, 0)).await);
        assert!(s.should_check_in_at("u1", local(21, 59)).await);
        assert!(!s.should_check_in_at("u1", local(22, 0)).await);
    }

    #[tokio::test]
    async fn test_forward_only_transitions() {
        let s = store();
        // cannot check out before checking in
        assert!(!s.should_check_out_at("u1", local(19, 0)).await);
        assert!(!s.mark_checked_out_at("u1", local(19, 0)).await);
        assert_eq!(s.status_at("u1", local(19, 0)).await, AttendanceDailyStatus::default());

        assert!(s.mark_checked_in_at("u1", local(9, 0)).await);
        assert!(!s.mark_checked_in_at("u1", local(9, 5)).await);
        assert!(!s.should_check_in_at("u1", local(10, 0)).await);
        assert!(!s.should_check_out_at("u1", local(17, 0)).await);
        assert!(s.should_check_out_at("u1", local(18, 30)).await);

        assert!(s.mark_checked_out_at("u1", local(18, 30)).await);
        assert!(!s.should_check_out_at("u1", local(19, 0)).await);
        let st = s.status_at("u1", local(19, 0)).await;
        assert!(st.checked_in && st.checked_out);
    }

    #[tokio::test]
    async fn test_online_users_and_cleanup() {
        let s = store();
        s.mark_checked_in_at("u2", local(9, 0)).await;
        s.mark_checked_in_at("u1", local(9, 0)).await;
        s.mark_checked_in_at("u3", local(9, 0)).await;
        s.mark_checked_out_at("u3", local(18, 0)).await;
        assert_eq!(s.online_users_at(local(12, 0)).await, vec!["u1", "u2"]);

        let tomorrow = local(9, 0) + chrono::Duration::days(1);
        assert!(s.should_check_in_at("u1", tomorrow).await);
        assert_eq!(s.tracked_days().await, 2);
        assert_eq!(s.cleanup_at(tomorrow).await, 1);
        assert_eq!(s.tracked_days().await, 1);
        assert!(s.online_users_at(tomorrow).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_marks_count_once() {
        let s = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = s.clone();
            handles.push(tokio::spawn(async move { s.mark_checked_in_at("u1", local(9, 0)).await }));
        }
        let mut moved = 0;
        for h in handles {
            if h.await.unwrap() {
                moved += 1;
            }
        }
        assert_eq!(moved, 1);
    }
}
