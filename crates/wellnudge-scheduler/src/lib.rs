//! # Wellnudge Scheduler
//!
//! Runs the reminder pipeline on timers and connects it to the outside world.
//!
//! ## Architecture
//! ```text
//! JobOrchestrator (tokio intervals)
//!   ├── AttendanceJob  → punches → AttendanceStateStore ──┐ sets status_ready
//!   ├── StatusJob      ← waits for status_ready ──────────┘
//!   │     └── busy time > threshold → health alert → DingTalk
//!   └── PipelineJob    → aggregate → rules → generate → DingTalk
//!
//! WellnudgeDb (SQLite) implements every store and lookup trait.
//! ```

pub mod attendance;
pub mod dispatch;
pub mod engine;
pub mod jobs;
pub mod persistence;

pub use attendance::{AttendanceDailyStatus, AttendanceStateStore};
pub use dispatch::DingTalkRobot;
pub use engine::JobOrchestrator;
pub use jobs::{AttendanceJob, Collaborators, PipelineJob, StatusJob};
pub use persistence::WellnudgeDb;
