//! Attendance, calendar, weather, step and profile data read from collaborators.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Punch direction of an attendance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckType {
    OnDuty,
    OffDuty,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::OnDuty => "OnDuty",
            CheckType::OffDuty => "OffDuty",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OnDuty" => Some(CheckType::OnDuty),
            "OffDuty" => Some(CheckType::OffDuty),
            _ => None,
        }
    }
}

/// One attendance punch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub check_time: DateTime<Utc>,
    pub check_type: CheckType,
}

/// A busy block from the user's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub user_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    /// Length in whole minutes; inverted intervals count as zero.
    pub fn duration_min(&self) -> i64 {
        (self.end - self.start).num_minutes().max(0)
    }
}

/// Current weather for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub condition: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// Step count for one user/day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub steps: u64,
}

/// Employee profile with message preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    /// Free-form profile extras (hobbies, age, ...).
    #[serde(default)]
    pub extension: Value,
    /// Preferences such as `message_style`.
    #[serde(default)]
    pub preferences: HashMap<String, String>,
}

impl UserProfile {
    pub fn new(user_id: &str, name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn message_style(&self) -> Option<&str> {
        self.preferences.get("message_style").map(String::as_str)
    }

    /// Personal daily water goal from `preferences.water_target_ml`, if positive.
    pub fn water_target_ml(&self) -> Option<f64> {
        self.preferences
            .get("water_target_ml")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|ml| ml.is_finite() && *ml > 0.0)
    }
}

/// Everything the ad hoc health-alert path gathers for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthContext {
    pub profile: UserProfile,
    pub weather: Option<WeatherReport>,
    /// Busy blocks of the last seven days.
    pub schedule: Vec<BusyInterval>,
    pub steps: Option<StepRecord>,
    /// Online minutes accumulated in the current busy period.
    pub online_minutes: i64,
}
