//! # Wellnudge Core
//!
//! Shared configuration, error type, domain types and the trait seams every
//! other Wellnudge crate is built against.

pub mod config;
pub mod error;
pub mod memory;
pub mod time;
pub mod traits;
pub mod types;

pub use config::WellnudgeConfig;
pub use error::{Result, WellnudgeError};
