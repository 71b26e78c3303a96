//! Domain types shared across Wellnudge crates.

pub mod attendance;
pub mod event;
pub mod metrics;
pub mod recommendation;
pub mod rule;

pub use attendance::{
    AttendanceRecord, BusyInterval, CheckType, HealthContext, StepRecord, UserProfile,
    WeatherReport,
};
pub use event::{Event, EventType};
pub use metrics::{DailyMetrics, MetricValue};
pub use recommendation::{
    DeliveryReceipt, NewRecommendation, Recommendation, RecommendationDraft, RecommendationStatus,
};
pub use rule::{CompareOp, Condition, RawRule, Rule, Slot, SlotTemplate};

/// A chat message sent to an LLM provider.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}
