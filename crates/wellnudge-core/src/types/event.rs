//! Raw telemetry events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of activity an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Work,
    Break,
    Water,
    Posture,
    Environment,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Work => "WORK",
            EventType::Break => "BREAK",
            EventType::Water => "WATER",
            EventType::Posture => "POSTURE",
            EventType::Environment => "ENVIRONMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "WORK" => Some(EventType::Work),
            "BREAK" => Some(EventType::Break),
            "WATER" => Some(EventType::Water),
            "POSTURE" => Some(EventType::Posture),
            "ENVIRONMENT" => Some(EventType::Environment),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped activity event reported by a desktop agent, IoT sensor or manual entry.
///
/// Immutable once created; only `processed` changes, and only through
/// `EventSource::mark_processed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    /// Reporter: "desktop", "iot", "manual".
    pub source: String,
    /// Event payload, e.g. `{"duration_min": 25}` or `{"amount_ml": 200}`.
    pub data: Value,
    #[serde(default)]
    pub processed: bool,
}

impl Event {
    pub fn new(user_id: &str, event_type: EventType, timestamp: DateTime<Utc>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            timestamp,
            event_type,
            source: "desktop".to_string(),
            data,
            processed: false,
        }
    }

    /// Numeric payload field; missing or non-numeric values read as 0.
    pub fn number(&self, key: &str) -> f64 {
        self.data.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Optional numeric payload field.
    pub fn opt_number(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }

    /// String payload field, ignoring empty strings.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_serde() {
        let json = serde_json::to_string(&EventType::Water).unwrap();
        assert_eq!(json, "\"WATER\"");
        let back: EventType = serde_json::from_str("\"POSTURE\"").unwrap();
        assert_eq!(back, EventType::Posture);
        assert_eq!(EventType::parse("environment"), Some(EventType::Environment));
        assert_eq!(EventType::parse("sleep"), None);
    }

    #[test]
    fn test_payload_accessors() {
        let e = Event::new(
            "u1",
            EventType::Posture,
            Utc::now(),
            serde_json::json!({"issue_type": "  ", "angle": 32.5}),
        );
        assert_eq!(e.text("issue_type"), None);
        assert_eq!(e.number("angle"), 32.5);
        assert_eq!(e.number("missing"), 0.0);
        assert!(e.opt_number("missing").is_none());
    }
}
