//! Daily aggregation: raw events → `DailyMetrics`.
//!
//! Metrics are always recomputed from the whole event log of the day, so
//! running the aggregation twice without new events yields the same row.

use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use wellnudge_core::config::AggregationConfig;
use wellnudge_core::error::Result;
use wellnudge_core::traits::EventSource;
use wellnudge_core::types::{DailyMetrics, Event, EventType};

pub struct Aggregator {
    events: Arc<dyn EventSource>,
    gap_tolerance: Duration,
    water_target_ml: f64,
}

impl Aggregator {
    pub fn new(events: Arc<dyn EventSource>, config: &AggregationConfig) -> Self {
        Self {
            events,
            gap_tolerance: Duration::try_seconds(config.gap_tolerance_secs).unwrap_or(Duration::MAX),
            water_target_ml: config.water_target_ml,
        }
    }

    /// Aggregate one user-day against the configured water target.
    pub async fn aggregate(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyMetrics>> {
        self.aggregate_with_target(user_id, date, None).await
    }

    /// Aggregate one user-day. `None` when the day has no events.
    ///
    /// `water_target_ml` overrides the configured target for this user.
    /// Every event still flagged unprocessed is marked processed afterwards.
    pub async fn aggregate_with_target(
        &self,
        user_id: &str,
        date: NaiveDate,
        water_target_ml: Option<f64>,
    ) -> Result<Option<DailyMetrics>> {
        let events = self.events.list_for_day(user_id, date).await?;
        if events.is_empty() {
            tracing::debug!("📭 No events to aggregate for {user_id} on {date}");
            return Ok(None);
        }

        let metrics = compute_metrics(
            user_id,
            date,
            &events,
            water_target_ml.unwrap_or(self.water_target_ml),
            self.gap_tolerance,
        );

        let pending: Vec<String> = events
            .iter()
            .filter(|e| !e.processed)
            .map(|e| e.id.clone())
            .collect();
        if !pending.is_empty() {
            self.events.mark_processed(&pending).await?;
        }

        tracing::info!(
            "📊 Aggregated {} events for {user_id} on {date} (work={}m, water={}ml)",
            metrics.events_count,
            metrics.work_duration_min,
            metrics.water_intake_ml
        );
        Ok(Some(metrics))
    }

    /// Aggregate several users for one day. A failing user is logged and skipped.
    pub async fn aggregate_users(&self, user_ids: &[String], date: NaiveDate) -> Vec<DailyMetrics> {
        let mut out = Vec::new();
        for user_id in user_ids {
            match self.aggregate(user_id, date).await {
                Ok(Some(m)) => out.push(m),
                Ok(None) => {}
                Err(e) => tracing::error!("❌ Aggregation failed for {user_id} on {date}: {e}"),
            }
        }
        out
    }
}

/// Pure metric computation over one user's events for one day.
pub fn compute_metrics(
    user_id: &str,
    date: NaiveDate,
    events: &[Event],
    water_target_ml: f64,
    gap_tolerance: Duration,
) -> DailyMetrics {
    let mut metrics = DailyMetrics::empty(user_id, date, water_target_ml);
    metrics.events_count = events.len() as u32;

    let of_type = |t: EventType| events.iter().filter(move |e| e.event_type == t);

    let mut work: Vec<&Event> = of_type(EventType::Work).collect();
    work.sort_by_key(|e| e.timestamp);
    let (total, longest) = work_sessions(&work, gap_tolerance);
    metrics.work_duration_min = total;
    metrics.continuous_max_min = longest;

    metrics.water_intake_ml = of_type(EventType::Water)
        .map(|e| e.number("amount_ml"))
        .filter(|ml| *ml > 0.0)
        .sum();
    metrics.water_progress = water_progress(metrics.water_intake_ml, water_target_ml);

    for e in of_type(EventType::Posture) {
        if let Some(issue) = e.text("issue_type") {
            metrics.posture_alerts += 1;
            metrics.posture_issues.insert(issue.to_string());
        }
    }

    for e in of_type(EventType::Break) {
        metrics.break_count += 1;
        let d = e.number("duration_min");
        if d > 0.0 {
            metrics.break_duration_min += d;
        }
    }

    if let Some(latest) = of_type(EventType::Environment).max_by_key(|e| e.timestamp) {
        metrics.environment_temperature = latest.opt_number("temperature");
        metrics.environment_humidity = latest.opt_number("humidity");
        metrics.environment_light = latest.opt_number("light");
        metrics.environment_noise = latest.opt_number("noise");
    }

    metrics
}

/// Total minutes and longest continuous session over time-sorted WORK events.
///
/// An event joins the running session when it starts no later than
/// `gap_tolerance` after the previous event ended (`timestamp + duration_min`).
/// Events whose end time is not representable are skipped.
fn work_sessions(sorted: &[&Event], gap_tolerance: Duration) -> (f64, f64) {
    let mut total = 0.0;
    let mut longest: f64 = 0.0;
    let mut current = 0.0;
    let mut prev_end = None;

    for e in sorted {
        let minutes = e.number("duration_min");
        if minutes <= 0.0 {
            continue;
        }
        let Some(end) = session_end(e, minutes) else {
            tracing::warn!(
                "⚠️ Skipping WORK event {} for {}: duration_min={minutes} out of range",
                e.id,
                e.user_id
            );
            continue;
        };
        total += minutes;
        current = match prev_end {
            Some(prev) if e.timestamp - prev <= gap_tolerance => current + minutes,
            _ => minutes,
        };
        longest = longest.max(current);
        prev_end = Some(end);
    }
    (total, longest)
}

fn session_end(e: &Event, minutes: f64) -> Option<chrono::DateTime<chrono::Utc>> {
    let secs = (minutes * 60.0).round();
    if !secs.is_finite() || secs >= i64::MAX as f64 {
        return None;
    }
    let span = Duration::try_seconds(secs as i64)?;
    e.timestamp.checked_add_signed(span)
}

/// `min(1, total/target)` rounded to two decimals.
fn water_progress(total_ml: f64, target_ml: f64) -> f64 {
    if target_ml <= 0.0 {
        return 0.0;
    }
    ((total_ml / target_ml).min(1.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use wellnudge_core::memory::InMemoryEventSource;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
    }

    fn work(ts: DateTime<Utc>, minutes: f64) -> Event {
        Event::new("u1", EventType::Work, ts, json!({"duration_min": minutes}))
    }

    fn aggregator(events: Vec<Event>) -> (Arc<InMemoryEventSource>, Aggregator) {
        let src = Arc::new(InMemoryEventSource::new(events));
        let agg = Aggregator::new(src.clone(), &AggregationConfig::default());
        (src, agg)
    }

    #[test]
    fn test_work_events_within_tolerance_merge() {
        // first session ends 09:30:00, next starts 250s later
        let events = vec![work(at(9, 0, 0), 30.0), work(at(9, 34, 10), 20.0)];
        let m = compute_metrics("u1", day(), &events, 1500.0, Duration::seconds(300));
        assert_eq!(m.work_duration_min, 50.0);
        assert_eq!(m.continuous_max_min, 50.0);
    }

    #[test]
    fn test_work_events_beyond_tolerance_split() {
        // 400s after the first session ends
        let events = vec![work(at(9, 0, 0), 30.0), work(at(9, 36, 40), 20.0)];
        let m = compute_metrics("u1", day(), &events, 1500.0, Duration::seconds(300));
        assert_eq!(m.work_duration_min, 50.0);
        assert_eq!(m.continuous_max_min, 30.0);
    }

    #[test]
    fn test_work_order_independent_of_input_order() {
        let events = vec![
            work(at(11, 0, 0), 45.0),
            work(at(9, 0, 0), 60.0),
            work(at(10, 2, 0), 50.0),
        ];
        let m = compute_metrics("u1", day(), &events, 1500.0, Duration::seconds(300));
        assert_eq!(m.work_duration_min, 155.0);
        assert_eq!(m.continuous_max_min, 110.0);
    }

    #[test]
    fn test_water_progress_rounds() {
        let events = vec![
            Event::new("u1", EventType::Water, at(9, 0, 0), json!({"amount_ml": 200})),
            Event::new("u1", EventType::Water, at(10, 0, 0), json!({"amount_ml": 300})),
        ];
        let m = compute_metrics("u1", day(), &events, 1500.0, Duration::seconds(300));
        assert_eq!(m.water_intake_ml, 500.0);
        assert_eq!(m.water_progress, 0.33);
    }

    #[test]
    fn test_water_progress_caps_at_one() {
        let events = vec![Event::new("u1", EventType::Water, at(9, 0, 0), json!({"amount_ml": 2000}))];
        let m = compute_metrics("u1", day(), &events, 1500.0, Duration::seconds(300));
        assert_eq!(m.water_progress, 1.0);
    }

    #[test]
    fn test_posture_break_environment() {
        let events = vec![
            Event::new("u1", EventType::Posture, at(9, 0, 0), json!({"issue_type": "slouch"})),
            Event::new("u1", EventType::Posture, at(9, 5, 0), json!({"issue_type": "slouch"})),
            Event::new("u1", EventType::Posture, at(9, 6, 0), json!({"issue_type": "neck_forward"})),
            Event::new("u1", EventType::Posture, at(9, 7, 0), json!({})),
            Event::new("u1", EventType::Break, at(10, 0, 0), json!({"duration_min": 5})),
            Event::new("u1", EventType::Break, at(11, 0, 0), json!({})),
            Event::new("u1", EventType::Environment, at(12, 0, 0), json!({"temperature": 30, "noise": 70})),
            Event::new("u1", EventType::Environment, at(8, 0, 0), json!({"temperature": 22, "humidity": 40})),
        ];
        let m = compute_metrics("u1", day(), &events, 1500.0, Duration::seconds(300));
        assert_eq!(m.posture_alerts, 3);
        assert_eq!(m.posture_issues.len(), 2);
        assert_eq!(m.break_count, 2);
        assert_eq!(m.break_duration_min, 5.0);
        assert_eq!(m.environment_temperature, Some(30.0));
        assert_eq!(m.environment_noise, Some(70.0));
        // latest event wins as a whole, older humidity is not carried over
        assert_eq!(m.environment_humidity, None);
        assert_eq!(m.events_count, 8);
    }

    #[test]
    fn test_out_of_range_work_duration_is_skipped() {
        let events = vec![
            work(at(9, 0, 0), 30.0),
            work(at(9, 31, 0), 1.0e15),
            work(at(9, 32, 0), 10.0),
        ];
        let m = compute_metrics("u1", day(), &events, 1500.0, Duration::seconds(300));
        assert_eq!(m.work_duration_min, 40.0);
        assert_eq!(m.continuous_max_min, 40.0);
        assert_eq!(m.events_count, 3);
    }

    #[tokio::test]
    async fn test_out_of_range_event_still_marked_processed() {
        let (src, agg) = aggregator(vec![work(at(9, 0, 0), 1.0e15)]);
        let m = agg.aggregate("u1", day()).await.unwrap().unwrap();
        assert_eq!(m.work_duration_min, 0.0);
        assert!(src.list_unprocessed("u1", day()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_per_user_water_target() {
        let (_, agg) = aggregator(vec![Event::new(
            "u1",
            EventType::Water,
            at(9, 0, 0),
            json!({"amount_ml": 500}),
        )]);
        let m = agg.aggregate_with_target("u1", day(), Some(2000.0)).await.unwrap().unwrap();
        assert_eq!(m.water_target_ml, 2000.0);
        assert_eq!(m.water_progress, 0.25);

        let m = agg.aggregate("u1", day()).await.unwrap().unwrap();
        assert_eq!(m.water_target_ml, 1500.0);
        assert_eq!(m.water_progress, 0.33);
    }

    #[tokio::test]
    async fn test_empty_day_returns_none() {
        let (_, agg) = aggregator(vec![]);
        assert!(agg.aggregate("u1", day()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_aggregate_marks_processed_and_is_idempotent() {
        let (src, agg) = aggregator(vec![
            work(at(9, 0, 0), 30.0),
            Event::new("u1", EventType::Water, at(9, 10, 0), json!({"amount_ml": 250})),
            Event::new("u2", EventType::Water, at(9, 10, 0), json!({"amount_ml": 100})),
        ]);

        let first = agg.aggregate("u1", day()).await.unwrap().unwrap();
        assert!(src.list_unprocessed("u1", day()).await.unwrap().is_empty());
        assert_eq!(src.list_unprocessed("u2", day()).await.unwrap().len(), 1);

        let second = agg.aggregate("u1", day()).await.unwrap().unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_aggregate_users_isolates_failing_user() {
        let src = Arc::new(
            InMemoryEventSource::new(vec![
                work(at(9, 0, 0), 30.0),
                Event::new("u2", EventType::Work, at(9, 0, 0), json!({"duration_min": 45})),
            ])
            .with_failing_users(&["u1"]),
        );
        let agg = Aggregator::new(src.clone(), &AggregationConfig::default());
        let out = agg
            .aggregate_users(&["u1".to_string(), "u2".to_string()], day())
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, "u2");
        assert_eq!(out[0].work_duration_min, 45.0);
        assert!(agg.aggregate("u1", day()).await.is_err());
    }

    #[tokio::test]
    async fn test_aggregate_users_skips_empty() {
        let (_, agg) = aggregator(vec![work(at(9, 0, 0), 30.0)]);
        let out = agg
            .aggregate_users(&["u1".to_string(), "nobody".to_string()], day())
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, "u1");
    }
}
