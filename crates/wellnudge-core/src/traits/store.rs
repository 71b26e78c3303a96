//! Persistence seams: events, rules, recommendations, metrics and archives.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::Result;
use crate::types::{
    AttendanceRecord, BusyInterval, DailyMetrics, Event, NewRecommendation, Recommendation,
    RecommendationStatus, Rule,
};

/// Supplies raw events per user/day.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events of that local day not yet aggregated.
    async fn list_unprocessed(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Event>>;

    /// Every event of that local day, processed or not.
    async fn list_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Event>>;

    /// Users that have unprocessed events on that day.
    async fn users_with_pending(&self, date: NaiveDate) -> Result<Vec<String>>;

    async fn mark_processed(&self, event_ids: &[String]) -> Result<()>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Active rules, highest priority first.
    async fn list_active(&self) -> Result<Vec<Rule>>;
}

#[async_trait]
pub trait RecommendationRepository: Send + Sync {
    async fn create(&self, data: NewRecommendation) -> Result<Recommendation>;

    /// Recommendations for `(user, rule)` created within `window` of now, newest first.
    async fn recent_by_rule(
        &self,
        user_id: &str,
        rule_id: &str,
        window: Duration,
    ) -> Result<Vec<Recommendation>>;

    async fn update_status(
        &self,
        id: &str,
        status: RecommendationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Insert or replace the single row for `(user_id, date)`.
    async fn upsert(&self, metrics: &DailyMetrics) -> Result<()>;

    async fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyMetrics>>;
}

/// Write-only log of attendance punches and busy blocks seen by the jobs.
#[async_trait]
pub trait ActivityArchive: Send + Sync {
    async fn save_attendance(&self, records: &[AttendanceRecord]) -> Result<()>;

    async fn save_busy_intervals(&self, intervals: &[BusyInterval]) -> Result<()>;
}
