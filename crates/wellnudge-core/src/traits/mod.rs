//! Trait seams between the pipeline and its collaborators.

pub mod lookup;
pub mod provider;
pub mod store;

pub use lookup::{
    AttendanceLookup, Delivery, FreeBusyLookup, ProfileLookup, StepsLookup, WeatherLookup,
};
pub use provider::{GenerateParams, LlmProvider};
pub use store::{
    ActivityArchive, EventSource, MetricsRepository, RecommendationRepository, RuleRepository,
};
