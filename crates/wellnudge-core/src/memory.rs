//! In-memory implementations of the collaborator traits.
//!
//! Used by tests across the workspace and handy for embedding without a database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::{Result, WellnudgeError};
use crate::time::local_date;
use crate::traits::*;
use crate::types::*;

/// Event log held in memory.
pub struct InMemoryEventSource {
    events: Mutex<Vec<Event>>,
    offset: FixedOffset,
    failing_users: Vec<String>,
}

impl InMemoryEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: Mutex::new(events),
            offset: Utc.fix(),
            failing_users: Vec::new(),
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Reads for these users fail, for isolation tests.
    pub fn with_failing_users(mut self, users: &[&str]) -> Self {
        self.failing_users = users.iter().map(|u| u.to_string()).collect();
        self
    }

    fn check(&self, user_id: &str) -> Result<()> {
        if self.failing_users.iter().any(|u| u == user_id) {
            return Err(WellnudgeError::Database(format!("event log unavailable for {user_id}")));
        }
        Ok(())
    }

    pub async fn push(&self, event: Event) {
        self.events.lock().await.push(event);
    }

    pub async fn snapshot(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    fn on_day(&self, e: &Event, user_id: &str, date: NaiveDate) -> bool {
        e.user_id == user_id && local_date(e.timestamp, self.offset) == date
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn list_unprocessed(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Event>> {
        self.check(user_id)?;
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|e| !e.processed && self.on_day(e, user_id, date))
            .cloned()
            .collect())
    }

    async fn list_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Event>> {
        self.check(user_id)?;
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|e| self.on_day(e, user_id, date))
            .cloned()
            .collect())
    }

    async fn users_with_pending(&self, date: NaiveDate) -> Result<Vec<String>> {
        let events = self.events.lock().await;
        let mut users: Vec<String> = events
            .iter()
            .filter(|e| !e.processed && local_date(e.timestamp, self.offset) == date)
            .map(|e| e.user_id.clone())
            .collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    async fn mark_processed(&self, event_ids: &[String]) -> Result<()> {
        let mut events = self.events.lock().await;
        for e in events.iter_mut().filter(|e| event_ids.contains(&e.id)) {
            e.processed = true;
        }
        Ok(())
    }
}

/// Fixed rule set.
pub struct InMemoryRules {
    rules: Vec<Rule>,
}

impl InMemoryRules {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl RuleRepository for InMemoryRules {
    async fn list_active(&self) -> Result<Vec<Rule>> {
        let mut active: Vec<Rule> = self.rules.iter().filter(|r| r.is_active).cloned().collect();
        active.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(active)
    }
}

/// Recommendation history held in memory.
#[derive(Default)]
pub struct InMemoryRecommendations {
    items: Mutex<Vec<Recommendation>>,
}

impl InMemoryRecommendations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a recommendation verbatim (including its `created_at`).
    pub async fn insert(&self, rec: Recommendation) {
        self.items.lock().await.push(rec);
    }

    pub async fn all(&self) -> Vec<Recommendation> {
        self.items.lock().await.clone()
    }
}

#[async_trait]
impl RecommendationRepository for InMemoryRecommendations {
    async fn create(&self, data: NewRecommendation) -> Result<Recommendation> {
        let rec = Recommendation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: data.user_id,
            rule_id: data.rule_id,
            content: data.content,
            slots: data.slots,
            context: data.context,
            status: RecommendationStatus::Created,
            sent_at: None,
            created_at: Utc::now(),
        };
        self.items.lock().await.push(rec.clone());
        Ok(rec)
    }

    async fn recent_by_rule(
        &self,
        user_id: &str,
        rule_id: &str,
        window: Duration,
    ) -> Result<Vec<Recommendation>> {
        let since = Utc::now() - window;
        let items = self.items.lock().await;
        let mut found: Vec<Recommendation> = items
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.rule_id.as_deref() == Some(rule_id)
                    && r.created_at > since
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update_status(
        &self,
        id: &str,
        status: RecommendationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut items = self.items.lock().await;
        let rec = items
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| WellnudgeError::Database(format!("recommendation {id} not found")))?;
        if rec.status != RecommendationStatus::Created {
            return Err(WellnudgeError::Database(format!(
                "recommendation {id} already {}",
                rec.status.as_str()
            )));
        }
        rec.status = status;
        rec.sent_at = sent_at;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMetrics {
    rows: Mutex<HashMap<(String, NaiveDate), DailyMetrics>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl MetricsRepository for InMemoryMetrics {
    async fn upsert(&self, metrics: &DailyMetrics) -> Result<()> {
        self.rows
            .lock()
            .await
            .insert((metrics.user_id.clone(), metrics.date), metrics.clone());
        Ok(())
    }

    async fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyMetrics>> {
        Ok(self.rows.lock().await.get(&(user_id.to_string(), date)).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryArchive {
    pub attendance: Mutex<Vec<AttendanceRecord>>,
    pub busy: Mutex<Vec<BusyInterval>>,
}

#[async_trait]
impl ActivityArchive for InMemoryArchive {
    async fn save_attendance(&self, records: &[AttendanceRecord]) -> Result<()> {
        self.attendance.lock().await.extend_from_slice(records);
        Ok(())
    }

    async fn save_busy_intervals(&self, intervals: &[BusyInterval]) -> Result<()> {
        self.busy.lock().await.extend_from_slice(intervals);
        Ok(())
    }
}

/// Canned answers for every read-only lookup.
#[derive(Default)]
pub struct StaticLookups {
    pub attendance: Mutex<HashMap<String, Vec<AttendanceRecord>>>,
    pub busy: Mutex<HashMap<String, Vec<BusyInterval>>>,
    pub weather: Option<WeatherReport>,
    pub steps: HashMap<String, StepRecord>,
    pub profiles: HashMap<String, UserProfile>,
    /// Users whose lookups fail, for isolation tests.
    pub failing_users: Vec<String>,
}

impl StaticLookups {
    fn check(&self, user_id: &str) -> Result<()> {
        if self.failing_users.iter().any(|u| u == user_id) {
            return Err(WellnudgeError::Lookup(format!("lookup failed for {user_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AttendanceLookup for StaticLookups {
    async fn records(&self, user_id: &str, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        self.check(user_id)?;
        let map = self.attendance.lock().await;
        Ok(map
            .get(user_id)
            .map(|v| v.iter().filter(|r| r.date == date).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl FreeBusyLookup for StaticLookups {
    async fn busy_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>> {
        self.check(user_id)?;
        let map = self.busy.lock().await;
        Ok(map
            .get(user_id)
            .map(|v| {
                v.iter()
                    .filter(|b| b.start < end && b.end > start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl WeatherLookup for StaticLookups {
    async fn current(&self, _city: &str) -> Result<Option<WeatherReport>> {
        Ok(self.weather.clone())
    }
}

#[async_trait]
impl StepsLookup for StaticLookups {
    async fn steps(&self, user_id: &str, _date: NaiveDate) -> Result<Option<StepRecord>> {
        Ok(self.steps.get(user_id).cloned())
    }
}

#[async_trait]
impl ProfileLookup for StaticLookups {
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.get(user_id).cloned())
    }
}

/// Delivery that records every message and answers with a fixed errcode.
#[derive(Default)]
pub struct RecordingDelivery {
    pub sent: Mutex<Vec<String>>,
    pub errcode: i64,
}

impl RecordingDelivery {
    pub fn failing(errcode: i64) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            errcode,
        }
    }

    pub async fn messages(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    fn receipt(&self) -> DeliveryReceipt {
        if self.errcode == 0 {
            DeliveryReceipt::ok()
        } else {
            DeliveryReceipt {
                errcode: self.errcode,
                errmsg: Some("rejected".into()),
            }
        }
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn send_text(&self, content: &str) -> DeliveryReceipt {
        self.sent.lock().await.push(content.to_string());
        self.receipt()
    }

    async fn send_markdown(&self, title: &str, content: &str) -> DeliveryReceipt {
        self.sent.lock().await.push(format!("## {title}\n{content}"));
        self.receipt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_event_source_day_filter_and_mark() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let ts = day.and_hms_opt(9, 0, 0).unwrap().and_utc();
        let a = Event::new("u1", EventType::Water, ts, json!({"amount_ml": 200}));
        let b = Event::new("u1", EventType::Water, ts - Duration::days(1), json!({"amount_ml": 300}));
        let src = InMemoryEventSource::new(vec![a.clone(), b]);

        assert_eq!(src.list_for_day("u1", day).await.unwrap().len(), 1);
        assert_eq!(src.users_with_pending(day).await.unwrap(), vec!["u1".to_string()]);

        src.mark_processed(&[a.id.clone()]).await.unwrap();
        assert!(src.list_unprocessed("u1", day).await.unwrap().is_empty());
        assert_eq!(src.list_for_day("u1", day).await.unwrap().len(), 1);
        assert!(src.users_with_pending(day).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let repo = InMemoryRecommendations::new();
        let rec = repo
            .create(NewRecommendation {
                user_id: "u1".into(),
                rule_id: None,
                content: "Drink water".into(),
                slots: vec![],
                context: json!({}),
            })
            .await
            .unwrap();
        repo.update_status(&rec.id, RecommendationStatus::Failed, None).await.unwrap();
        assert!(repo
            .update_status(&rec.id, RecommendationStatus::Sent, Some(Utc::now()))
            .await
            .is_err());
        let stored = repo.all().await;
        assert_eq!(stored[0].status, RecommendationStatus::Failed);
        assert!(stored[0].sent_at.is_none());
        assert!(repo.update_status("missing", RecommendationStatus::Sent, None).await.is_err());
    }

    #[tokio::test]
    async fn test_recent_by_rule_window() {
        let repo = InMemoryRecommendations::new();
        let old = Recommendation {
            id: "old".into(),
            user_id: "u1".into(),
            rule_id: Some("r1".into()),
            content: "x".into(),
            slots: vec![],
            context: json!({}),
            status: RecommendationStatus::Sent,
            sent_at: None,
            created_at: Utc::now() - Duration::minutes(90),
        };
        repo.insert(old).await;
        assert!(repo.recent_by_rule("u1", "r1", Duration::minutes(60)).await.unwrap().is_empty());
        assert_eq!(repo.recent_by_rule("u1", "r1", Duration::minutes(120)).await.unwrap().len(), 1);
        assert!(repo.recent_by_rule("u2", "r1", Duration::minutes(120)).await.unwrap().is_empty());
    }
}
