//! Read-only collaborators and the outbound messaging channel.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::types::{
    AttendanceRecord, BusyInterval, DeliveryReceipt, StepRecord, UserProfile, WeatherReport,
};

#[async_trait]
pub trait AttendanceLookup: Send + Sync {
    /// Punches recorded for the user on that day.
    async fn records(&self, user_id: &str, date: NaiveDate) -> Result<Vec<AttendanceRecord>>;
}

#[async_trait]
pub trait FreeBusyLookup: Send + Sync {
    /// Busy blocks overlapping `[start, end)`.
    async fn busy_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>>;
}

#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn current(&self, city: &str) -> Result<Option<WeatherReport>>;
}

#[async_trait]
pub trait StepsLookup: Send + Sync {
    async fn steps(&self, user_id: &str, date: NaiveDate) -> Result<Option<StepRecord>>;
}

#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>>;
}

/// Pushes content to the messaging channel. Failures come back as a non-zero `errcode`.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send_text(&self, content: &str) -> DeliveryReceipt;

    async fn send_markdown(&self, title: &str, content: &str) -> DeliveryReceipt;
}
