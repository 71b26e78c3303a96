//! The three periodic jobs.
//!
//! - `AttendanceJob`: punches → attendance state (check-in / check-out)
//! - `StatusJob`: busy time of online users → ad hoc health alerts
//! - `PipelineJob`: events → metrics → rules → messages → delivery
//!
//! Every job isolates failures per user: one bad user is logged and skipped.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use wellnudge_core::config::WellnudgeConfig;
use wellnudge_core::error::Result;
use wellnudge_core::time::{day_bounds, local_date, offset_hours};
use wellnudge_core::traits::*;
use wellnudge_core::types::{
    CheckType, DailyMetrics, HealthContext, RecommendationDraft, RecommendationStatus, UserProfile,
};
use wellnudge_engine::{Aggregator, RecommendationGenerator, RuleEngine};

use crate::attendance::AttendanceStateStore;
use crate::persistence::WellnudgeDb;

/// Days of calendar history attached to a health alert.
const SCHEDULE_LOOKBACK_DAYS: i64 = 7;

/// Every store, lookup and channel the jobs talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub events: Arc<dyn EventSource>,
    pub rules: Arc<dyn RuleRepository>,
    pub recommendations: Arc<dyn RecommendationRepository>,
    pub metrics: Arc<dyn MetricsRepository>,
    pub archive: Arc<dyn ActivityArchive>,
    pub attendance: Arc<dyn AttendanceLookup>,
    pub freebusy: Arc<dyn FreeBusyLookup>,
    pub weather: Arc<dyn WeatherLookup>,
    pub steps: Arc<dyn StepsLookup>,
    pub profiles: Arc<dyn ProfileLookup>,
    pub delivery: Arc<dyn Delivery>,
}

impl Collaborators {
    /// Everything backed by one SQLite database, plus a delivery channel.
    pub fn from_db(db: Arc<WellnudgeDb>, delivery: Arc<dyn Delivery>) -> Self {
        Self {
            events: db.clone(),
            rules: db.clone(),
            recommendations: db.clone(),
            metrics: db.clone(),
            archive: db.clone(),
            attendance: db.clone(),
            freebusy: db.clone(),
            weather: db.clone(),
            steps: db.clone(),
            profiles: db,
            delivery,
        }
    }
}

/// Persist a draft, send it, and record the delivery outcome.
async fn deliver_draft(
    recommendations: &dyn RecommendationRepository,
    delivery: &dyn Delivery,
    user_id: &str,
    draft: RecommendationDraft,
) -> Result<RecommendationStatus> {
    let rec = recommendations.create(draft.into_new(user_id)).await?;
    let receipt = delivery.send_text(&rec.content).await;
    let (status, sent_at) = if receipt.is_success() {
        (RecommendationStatus::Sent, Some(Utc::now()))
    } else {
        tracing::warn!(
            "⚠️ Delivery failed for {user_id} (recommendation {}): errcode={}",
            rec.id,
            receipt.errcode
        );
        (RecommendationStatus::Failed, None)
    };
    recommendations.update_status(&rec.id, status, sent_at).await?;
    Ok(status)
}

/// Profile for a user, or a bare one named after the id.
async fn profile_or_default(profiles: &dyn ProfileLookup, user_id: &str) -> UserProfile {
    match profiles.profile(user_id).await {
        Ok(Some(p)) => p,
        Ok(None) => UserProfile::new(user_id, user_id),
        Err(e) => {
            tracing::warn!("⚠️ Profile lookup failed for {user_id}: {e}");
            UserProfile::new(user_id, user_id)
        }
    }
}

// ─── Attendance ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    pub checked_in: usize,
    pub checked_out: usize,
    pub failed: usize,
}

pub struct AttendanceJob {
    state: Arc<AttendanceStateStore>,
    lookup: Arc<dyn AttendanceLookup>,
    archive: Arc<dyn ActivityArchive>,
    user_ids: Vec<String>,
}

impl AttendanceJob {
    pub fn new(state: Arc<AttendanceStateStore>, collab: &Collaborators, user_ids: Vec<String>) -> Self {
        Self {
            state,
            lookup: collab.attendance.clone(),
            archive: collab.archive.clone(),
            user_ids,
        }
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> AttendanceSummary {
        let mut summary = AttendanceSummary::default();
        for user_id in &self.user_ids {
            match self.process_user(user_id, now).await {
                Ok(Some(CheckType::OnDuty)) => {
                    tracing::info!("🟢 {user_id} checked in");
                    summary.checked_in += 1;
                }
                Ok(Some(CheckType::OffDuty)) => {
                    tracing::info!("🔴 {user_id} checked out");
                    summary.checked_out += 1;
                }
                Ok(None) => tracing::debug!("⏭️ No attendance change for {user_id}"),
                Err(e) => {
                    tracing::error!("❌ Attendance processing failed for {user_id}: {e}");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    async fn process_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<CheckType>> {
        let wanted = if self.state.should_check_in_at(user_id, now).await {
            CheckType::OnDuty
        } else if self.state.should_check_out_at(user_id, now).await {
            CheckType::OffDuty
        } else {
            return Ok(None);
        };

        let today = self.state.today_at(now);
        let records = self.lookup.records(user_id, today).await?;
        if !records.iter().any(|r| r.check_type == wanted) {
            return Ok(None);
        }
        self.archive.save_attendance(&records).await?;

        let moved = match wanted {
            CheckType::OnDuty => self.state.mark_checked_in_at(user_id, now).await,
            CheckType::OffDuty => self.state.mark_checked_out_at(user_id, now).await,
        };
        Ok(moved.then_some(wanted))
    }
}

// ─── Status / health alerts ────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub checked: usize,
    pub alerted: usize,
    pub failed: usize,
}

pub struct StatusJob {
    state: Arc<AttendanceStateStore>,
    collab: Collaborators,
    generator: Arc<RecommendationGenerator>,
    threshold_min: i64,
    city: String,
}

impl StatusJob {
    pub fn new(
        state: Arc<AttendanceStateStore>,
        collab: Collaborators,
        generator: Arc<RecommendationGenerator>,
        config: &WellnudgeConfig,
    ) -> Self {
        Self {
            state,
            collab,
            generator,
            threshold_min: config.scheduler.online_threshold_min,
            city: config.scheduler.default_city.clone(),
        }
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> StatusSummary {
        let mut summary = StatusSummary::default();
        for user_id in self.state.online_users_at(now).await {
            summary.checked += 1;
            match self.process_user(&user_id, now).await {
                Ok(true) => summary.alerted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("❌ Status check failed for {user_id}: {e}");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Returns true when an alert was generated for the user.
    async fn process_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let today = self.state.today_at(now);
        let (start, end) = day_bounds(today, self.state.offset());
        let busy = self.collab.freebusy.busy_between(user_id, start, end).await?;
        if !busy.is_empty() {
            self.collab.archive.save_busy_intervals(&busy).await?;
        }

        let online_minutes: i64 = busy.iter().map(|b| b.duration_min()).sum();
        if online_minutes <= self.threshold_min {
            tracing::debug!("🙂 {user_id} online {online_minutes}m, under threshold");
            return Ok(false);
        }
        tracing::info!("⏰ {user_id} online {online_minutes}m, building health alert");

        let ctx = self.health_context(user_id, now, online_minutes).await;
        let draft = self.generator.health_alert(&ctx).await;
        let status = deliver_draft(
            self.collab.recommendations.as_ref(),
            self.collab.delivery.as_ref(),
            user_id,
            draft,
        )
        .await?;
        tracing::info!("💌 Health alert for {user_id}: {}", status.as_str());
        Ok(true)
    }

    /// Optional context lookups degrade to empty values.
    async fn health_context(&self, user_id: &str, now: DateTime<Utc>, online_minutes: i64) -> HealthContext {
        let profile = profile_or_default(self.collab.profiles.as_ref(), user_id).await;
        let weather = self.collab.weather.current(&self.city).await.unwrap_or_else(|e| {
            tracing::warn!("⚠️ Weather lookup failed for {}: {e}", self.city);
            None
        });
        let schedule = self
            .collab
            .freebusy
            .busy_between(user_id, now - Duration::days(SCHEDULE_LOOKBACK_DAYS), now)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("⚠️ Schedule lookup failed for {user_id}: {e}");
                Vec::new()
            });
        let steps = self
            .collab
            .steps
            .steps(user_id, self.state.today_at(now))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("⚠️ Step lookup failed for {user_id}: {e}");
                None
            });
        HealthContext {
            profile,
            weather,
            schedule,
            steps,
            online_minutes,
        }
    }
}

// ─── Aggregation pipeline ──────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub users: usize,
    pub sent: usize,
    pub failed_deliveries: usize,
    pub failed_users: usize,
}

pub struct PipelineJob {
    aggregator: Aggregator,
    rules: RuleEngine,
    generator: Arc<RecommendationGenerator>,
    collab: Collaborators,
    offset: FixedOffset,
}

impl PipelineJob {
    pub fn new(
        collab: Collaborators,
        generator: Arc<RecommendationGenerator>,
        config: &WellnudgeConfig,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(collab.events.clone(), &config.aggregation),
            rules: RuleEngine::new(collab.rules.clone(), collab.recommendations.clone()),
            generator,
            offset: offset_hours(config.attendance.utc_offset_hours),
            collab,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Process yesterday and today, so late events for yesterday still count.
    pub async fn run_at(&self, now: DateTime<Utc>) -> PipelineSummary {
        let today = local_date(now, self.offset);
        let mut summary = PipelineSummary::default();
        for date in [today - Duration::days(1), today] {
            let users = match self.collab.events.users_with_pending(date).await {
                Ok(u) => u,
                Err(e) => {
                    tracing::error!("❌ Could not list pending users for {date}: {e}");
                    continue;
                }
            };
            for user_id in users {
                summary.users += 1;
                match self.process_user(&user_id, date).await {
                    Ok((sent, failed)) => {
                        summary.sent += sent;
                        summary.failed_deliveries += failed;
                    }
                    Err(e) => {
                        tracing::error!("❌ Pipeline failed for {user_id} on {date}: {e}");
                        summary.failed_users += 1;
                    }
                }
            }
        }
        tracing::info!(
            "🔁 Pipeline done: {} user(s), {} sent, {} failed",
            summary.users,
            summary.sent,
            summary.failed_deliveries
        );
        summary
    }

    /// Returns `(sent, failed)` delivery counts for the user-day.
    async fn process_user(&self, user_id: &str, date: NaiveDate) -> Result<(usize, usize)> {
        let profile = profile_or_default(self.collab.profiles.as_ref(), user_id).await;
        let Some(metrics) = self
            .aggregator
            .aggregate_with_target(user_id, date, profile.water_target_ml())
            .await?
        else {
            return Ok((0, 0));
        };
        self.collab.metrics.upsert(&metrics).await?;
        self.recommend(&profile, &metrics).await
    }

    async fn recommend(&self, profile: &UserProfile, metrics: &DailyMetrics) -> Result<(usize, usize)> {
        let user_id = profile.user_id.as_str();
        let slots = self.rules.match_rules(user_id, metrics).await?;
        if slots.is_empty() {
            return Ok((0, 0));
        }
        let drafts = self.generator.generate(profile, &slots, metrics).await;

        let (mut sent, mut failed) = (0, 0);
        for draft in drafts {
            match deliver_draft(
                self.collab.recommendations.as_ref(),
                self.collab.delivery.as_ref(),
                user_id,
                draft,
            )
            .await?
            {
                RecommendationStatus::Sent => sent += 1,
                _ => failed += 1,
            }
        }
        Ok((sent, failed))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;
    use wellnudge_core::memory::*;
    use wellnudge_core::types::{AttendanceRecord, BusyInterval, Event, RawRule, Rule};
    use wellnudge_providers::ProviderRouter;

    pub struct Fixture {
        pub events: Arc<InMemoryEventSource>,
        pub recommendations: Arc<InMemoryRecommendations>,
        pub metrics: Arc<InMemoryMetrics>,
        pub archive: Arc<InMemoryArchive>,
        pub lookups: Arc<StaticLookups>,
        pub delivery: Arc<RecordingDelivery>,
        pub rules: Vec<Rule>,
    }

    impl Fixture {
        pub fn new(lookups: StaticLookups, delivery: RecordingDelivery) -> Self {
            Self {
                events: Arc::new(InMemoryEventSource::new(Vec::new()).with_offset(offset_hours(8))),
                recommendations: Arc::new(InMemoryRecommendations::new()),
                metrics: Arc::new(InMemoryMetrics::new()),
                archive: Arc::new(InMemoryArchive::default()),
                lookups: Arc::new(lookups),
                delivery: Arc::new(delivery),
                rules: Vec::new(),
            }
        }

        pub fn collaborators(&self) -> Collaborators {
            Collaborators {
                events: self.events.clone(),
                rules: Arc::new(InMemoryRules::new(self.rules.clone())),
                recommendations: self.recommendations.clone(),
                metrics: self.metrics.clone(),
                archive: self.archive.clone(),
                attendance: self.lookups.clone(),
                freebusy: self.lookups.clone(),
                weather: self.lookups.clone(),
                steps: self.lookups.clone(),
                profiles: self.lookups.clone(),
                delivery: self.delivery.clone(),
            }
        }
    }

    /// Generator with no providers, so every message is a template.
    pub fn offline_generator() -> Arc<RecommendationGenerator> {
        let router = ProviderRouter::new("openai", Vec::new(), std::time::Duration::from_secs(1));
        Arc::new(RecommendationGenerator::new(Arc::new(router), &WellnudgeConfig::default()))
    }

    /// Local (UTC+8) wall-clock time on 2026-03-02.
    pub fn local(h: u32, m: u32) -> DateTime<Utc> {
        use chrono::TimeZone;
        offset_hours(8)
            .with_ymd_and_hms(2026, 3, 2, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    pub fn punch(user_id: &str, at: DateTime<Utc>, check_type: CheckType) -> AttendanceRecord {
        AttendanceRecord {
            user_id: user_id.into(),
            date: local_date(at, offset_hours(8)),
            check_time: at,
            check_type,
        }
    }

    pub fn busy(user_id: &str, start: DateTime<Utc>, minutes: i64) -> BusyInterval {
        BusyInterval {
            user_id: user_id.into(),
            start,
            end: start + Duration::minutes(minutes),
        }
    }

    pub fn lookups_with(
        punches: Vec<AttendanceRecord>,
        busy: Vec<BusyInterval>,
        failing_users: Vec<String>,
    ) -> StaticLookups {
        let mut by_user: HashMap<String, Vec<AttendanceRecord>> = HashMap::new();
        for p in punches {
            by_user.entry(p.user_id.clone()).or_default().push(p);
        }
        let mut busy_by_user: HashMap<String, Vec<BusyInterval>> = HashMap::new();
        for b in busy {
            busy_by_user.entry(b.user_id.clone()).or_default().push(b);
        }
        StaticLookups {
            attendance: Mutex::new(by_user),
            busy: Mutex::new(busy_by_user),
            failing_users,
            ..Default::default()
        }
    }

    pub fn sitting_rule() -> Rule {
        Rule::from_raw(RawRule {
            id: "r-sit".into(),
            name: "long sitting".into(),
            condition: serde_json::json!({
                "type": "break", "metric": "continuous_max_min", "op": ">=", "value": 120
            }),
            slot_template: serde_json::json!({
                "reason": "sat for {value} minutes", "action": "walk for 5 minutes"
            }),
            is_active: true,
            priority: 10,
            cooldown_minutes: 60,
        })
        .unwrap()
    }

    pub fn work_event(user_id: &str, at: DateTime<Utc>, minutes: u32) -> Event {
        Event::new(
            user_id,
            wellnudge_core::types::EventType::Work,
            at,
            serde_json::json!({ "duration_min": minutes }),
        )
    }
}
