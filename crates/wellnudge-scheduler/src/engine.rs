//! Job orchestrator: independent timers with a readiness gate.
//!
//! The attendance job sets `status_ready` when it completes; the status job
//! consumes it. A status tick before the first attendance pass does nothing.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use wellnudge_core::config::{SchedulerConfig, WellnudgeConfig};
use wellnudge_engine::RecommendationGenerator;

use crate::attendance::AttendanceStateStore;
use crate::jobs::{
    AttendanceJob, AttendanceSummary, Collaborators, PipelineJob, PipelineSummary, StatusJob,
    StatusSummary,
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct GateState {
    pub status_ready: bool,
    pub last_attendance_time: Option<DateTime<Utc>>,
    /// Local day of the last attendance tick, for daily cleanup.
    last_day: Option<NaiveDate>,
}

pub struct JobOrchestrator {
    state: Arc<AttendanceStateStore>,
    attendance: AttendanceJob,
    status: StatusJob,
    pipeline: PipelineJob,
    gate: Mutex<GateState>,
    intervals: SchedulerConfig,
}

impl JobOrchestrator {
    pub fn new(
        config: &WellnudgeConfig,
        collab: Collaborators,
        generator: Arc<RecommendationGenerator>,
    ) -> Self {
        let state = Arc::new(AttendanceStateStore::new(&config.attendance));
        Self {
            attendance: AttendanceJob::new(state.clone(), &collab, config.scheduler.user_ids.clone()),
            status: StatusJob::new(state.clone(), collab.clone(), generator.clone(), config),
            pipeline: PipelineJob::new(collab, generator, config),
            state,
            gate: Mutex::new(GateState::default()),
            intervals: config.scheduler.clone(),
        }
    }

    pub fn attendance_state(&self) -> &Arc<AttendanceStateStore> {
        &self.state
    }

    pub fn pipeline(&self) -> &PipelineJob {
        &self.pipeline
    }

    pub async fn gate(&self) -> GateState {
        self.gate.lock().await.clone()
    }

    pub async fn run_attendance_tick_at(&self, now: DateTime<Utc>) -> AttendanceSummary {
        let today = self.state.today_at(now);
        let day_changed = {
            let mut gate = self.gate.lock().await;
            let changed = gate.last_day.is_some_and(|d| d != today);
            gate.last_day = Some(today);
            changed
        };
        if day_changed {
            self.state.cleanup_at(now).await;
        }

        tracing::info!("🕘 Attendance tick");
        let summary = self.attendance.run_at(now).await;

        let mut gate = self.gate.lock().await;
        gate.status_ready = true;
        gate.last_attendance_time = Some(now);
        tracing::info!(
            "✅ Attendance tick done: {} in, {} out, {} failed",
            summary.checked_in,
            summary.checked_out,
            summary.failed
        );
        summary
    }

    /// `None` when the gate is closed.
    pub async fn run_status_tick_at(&self, now: DateTime<Utc>) -> Option<StatusSummary> {
        {
            let mut gate = self.gate.lock().await;
            if !gate.status_ready {
                tracing::info!("⏳ Status job waiting for attendance pass");
                return None;
            }
            gate.status_ready = false;
        }
        tracing::info!("🩺 Status tick");
        let summary = self.status.run_at(now).await;
        tracing::info!(
            "✅ Status tick done: {} online, {} alerted, {} failed",
            summary.checked,
            summary.alerted,
            summary.failed
        );
        Some(summary)
    }

    pub async fn run_pipeline_tick_at(&self, now: DateTime<Utc>) -> PipelineSummary {
        self.pipeline.run_at(now).await
    }

    /// Run one attendance pass now.
    pub async fn trigger_attendance(&self) -> AttendanceSummary {
        self.run_attendance_tick_at(Utc::now()).await
    }

    /// Run one status pass now, if the gate is open.
    pub async fn trigger_status(&self) -> Option<StatusSummary> {
        self.run_status_tick_at(Utc::now()).await
    }

    pub async fn trigger_pipeline(&self) -> PipelineSummary {
        self.run_pipeline_tick_at(Utc::now()).await
    }

    /// Start the three timer loops. Each loop survives failing ticks.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let cfg = &self.intervals;
        tracing::info!(
            "⏰ Scheduler started (attendance {}s, status {}s, pipeline {}s)",
            cfg.attendance_interval_secs,
            cfg.status_interval_secs,
            cfg.pipeline_interval_secs
        );
        let now = Instant::now();

        let this = self.clone();
        let attendance = spawn_every(
            "attendance",
            now,
            Duration::from_secs(cfg.attendance_interval_secs.max(1)),
            move || {
                let this = this.clone();
                async move {
                    this.trigger_attendance().await;
                }
            },
        );

        let this = self.clone();
        let status = spawn_every(
            "status",
            now + Duration::from_secs(cfg.status_initial_delay_secs),
            Duration::from_secs(cfg.status_interval_secs.max(1)),
            move || {
                let this = this.clone();
                async move {
                    this.trigger_status().await;
                }
            },
        );

        let this = self.clone();
        let pipeline = spawn_every(
            "pipeline",
            now,
            Duration::from_secs(cfg.pipeline_interval_secs.max(1)),
            move || {
                let this = this.clone();
                async move {
                    this.trigger_pipeline().await;
                }
            },
        );

        vec![attendance, status, pipeline]
    }
}

/// Timer loop. Each tick runs on its own task, so a panicking tick is
/// logged and the next one still fires.
fn spawn_every<F, Fut>(job: &'static str, start: Instant, period: Duration, tick: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(start, period);
        loop {
            interval.tick().await;
            if let Err(e) = tokio::spawn(tick()).await {
                tracing::error!("💥 {job} tick aborted: {e}");
            }
        }
    })
}
