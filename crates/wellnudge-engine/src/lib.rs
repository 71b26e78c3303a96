//! # Wellnudge Engine
//!
//! The reminder pipeline proper:
//! - `aggregator`: raw events → daily metrics (continuous-session merge)
//! - `rules`: metrics → slots (typed conditions, cooldown, first match per type)
//! - `recommend`: slots → messages via the provider router, with templates
//! - `stats`: generation counters

pub mod aggregator;
pub mod recommend;
pub mod rules;
pub mod stats;

pub use aggregator::Aggregator;
pub use recommend::RecommendationGenerator;
pub use rules::RuleEngine;
pub use stats::GenerationStats;
