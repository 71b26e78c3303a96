//! Daily behavioral metrics and the dynamic value type rules compare against.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A metric or rule-condition value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    List(Vec<MetricValue>),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a JSON value. Booleans become 0/1, objects and nulls are rejected.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(MetricValue::Number),
            serde_json::Value::String(s) => Some(MetricValue::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(MetricValue::Number(if *b { 1.0 } else { 0.0 })),
            serde_json::Value::Array(items) => items
                .iter()
                .map(MetricValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(MetricValue::List),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
        }
    }
}

/// Aggregated metrics for one user on one day.
///
/// Derived from the day's event log; at most one row per `(user_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub user_id: String,
    pub date: NaiveDate,
    pub work_duration_min: f64,
    pub continuous_max_min: f64,
    pub water_intake_ml: f64,
    pub water_target_ml: f64,
    /// Fraction of the water target reached, clamped to 0..=1 and rounded to 2 decimals.
    pub water_progress: f64,
    pub break_count: u32,
    pub break_duration_min: f64,
    pub posture_alerts: u32,
    pub posture_issues: BTreeSet<String>,
    pub environment_temperature: Option<f64>,
    pub environment_humidity: Option<f64>,
    pub environment_light: Option<f64>,
    pub environment_noise: Option<f64>,
    pub events_count: u32,
}

impl DailyMetrics {
    /// Zeroed metrics for a user/day.
    pub fn empty(user_id: &str, date: NaiveDate, water_target_ml: f64) -> Self {
        Self {
            user_id: user_id.to_string(),
            date,
            work_duration_min: 0.0,
            continuous_max_min: 0.0,
            water_intake_ml: 0.0,
            water_target_ml,
            water_progress: 0.0,
            break_count: 0,
            break_duration_min: 0.0,
            posture_alerts: 0,
            posture_issues: BTreeSet::new(),
            environment_temperature: None,
            environment_humidity: None,
            environment_light: None,
            environment_noise: None,
            events_count: 0,
        }
    }

    /// Flatten into the `metric name -> value` map rule conditions are evaluated against.
    ///
    /// Environment readings that were never reported are absent, so a rule on them
    /// evaluates to false.
    pub fn to_metric_map(&self) -> BTreeMap<String, MetricValue> {
        let mut map = BTreeMap::new();
        let mut num = |k: &str, v: f64| {
            map.insert(k.to_string(), MetricValue::Number(v));
        };
        num("work_duration_min", self.work_duration_min);
        num("continuous_max_min", self.continuous_max_min);
        num("water_intake_ml", self.water_intake_ml);
        num("water_target_ml", self.water_target_ml);
        num("water_progress", self.water_progress);
        num("break_count", self.break_count as f64);
        num("break_duration_min", self.break_duration_min);
        num("posture_alerts", self.posture_alerts as f64);
        num("events_count", self.events_count as f64);

        let env = [
            ("environment_temperature", self.environment_temperature),
            ("environment_humidity", self.environment_humidity),
            ("environment_light", self.environment_light),
            ("environment_noise", self.environment_noise),
        ];
        for (k, v) in env {
            if let Some(v) = v {
                map.insert(k.to_string(), MetricValue::Number(v));
            }
        }

        map.insert(
            "posture_issues".to_string(),
            MetricValue::List(
                self.posture_issues
                    .iter()
                    .cloned()
                    .map(MetricValue::Text)
                    .collect(),
            ),
        );
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_map_skips_unreported_environment() {
        let mut m = DailyMetrics::empty("u1", NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), 1500.0);
        m.environment_noise = Some(62.0);
        let map = m.to_metric_map();
        assert_eq!(map.get("environment_noise"), Some(&MetricValue::Number(62.0)));
        assert!(!map.contains_key("environment_temperature"));
        assert_eq!(map.get("water_target_ml"), Some(&MetricValue::Number(1500.0)));
    }

    #[test]
    fn test_metric_value_display_and_json() {
        assert_eq!(MetricValue::Number(125.0).to_string(), "125");
        assert_eq!(MetricValue::Number(0.33).to_string(), "0.33");
        let v = MetricValue::from_json(&serde_json::json!(["neck", "back"])).unwrap();
        assert_eq!(v.to_string(), "[neck,back]");
        assert!(MetricValue::from_json(&serde_json::json!({"a": 1})).is_none());
    }
}
