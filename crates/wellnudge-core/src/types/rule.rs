//! Reminder rules and the slots they produce.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Result, WellnudgeError};
use crate::types::metrics::MetricValue;

/// Comparison operator of a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
}

impl CompareOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            "in" => Some(CompareOp::In),
            "not_in" => Some(CompareOp::NotIn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not_in",
        }
    }

    fn needs_list(&self) -> bool {
        matches!(self, CompareOp::In | CompareOp::NotIn)
    }
}

/// A validated rule condition: `metric op value`, tagged with a reminder type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Reminder category ("break", "hydration", ...). One slot per category per pass.
    #[serde(rename = "type")]
    pub kind: String,
    pub metric: String,
    pub op: CompareOp,
    pub value: MetricValue,
}

impl Condition {
    /// Evaluate against a metric map. A missing metric is false, never an error.
    pub fn evaluate(&self, metrics: &BTreeMap<String, MetricValue>) -> bool {
        let Some(actual) = metrics.get(&self.metric) else {
            return false;
        };
        match self.op {
            CompareOp::Eq => values_equal(actual, &self.value),
            CompareOp::Ne => !values_equal(actual, &self.value),
            CompareOp::Gt => ordering(actual, &self.value).is_some_and(|o| o.is_gt()),
            CompareOp::Ge => ordering(actual, &self.value).is_some_and(|o| o.is_ge()),
            CompareOp::Lt => ordering(actual, &self.value).is_some_and(|o| o.is_lt()),
            CompareOp::Le => ordering(actual, &self.value).is_some_and(|o| o.is_le()),
            CompareOp::In => contained_in(actual, &self.value),
            CompareOp::NotIn => !contained_in(actual, &self.value),
        }
    }
}

fn values_equal(a: &MetricValue, b: &MetricValue) -> bool {
    match (a, b) {
        (MetricValue::Number(x), MetricValue::Number(y)) => (x - y).abs() < f64::EPSILON,
        (MetricValue::List(xs), MetricValue::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

fn ordering(a: &MetricValue, b: &MetricValue) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (MetricValue::Number(x), MetricValue::Number(y)) => x.partial_cmp(y),
        (MetricValue::Text(x), MetricValue::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Scalars are looked up in the list; a list metric matches if any element is in it.
fn contained_in(actual: &MetricValue, set: &MetricValue) -> bool {
    let MetricValue::List(items) = set else {
        return false;
    };
    match actual {
        MetricValue::List(values) => values
            .iter()
            .any(|v| items.iter().any(|i| values_equal(v, i))),
        scalar => items.iter().any(|i| values_equal(scalar, i)),
    }
}

/// The shape of the slot a rule emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotTemplate {
    #[serde(rename = "type")]
    pub kind: String,
    /// May contain a `{value}` placeholder for the triggering metric value.
    pub reason: String,
    #[serde(default)]
    pub action: String,
}

/// A validated reminder rule. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub condition: Condition,
    pub slot_template: SlotTemplate,
    pub is_active: bool,
    /// Higher runs first.
    pub priority: i32,
    pub cooldown_minutes: u32,
}

/// A rule as stored: condition and slot template are untyped JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRule {
    pub id: String,
    pub name: String,
    pub condition: Value,
    pub slot_template: Value,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: u32,
}

fn default_active() -> bool { true }
fn default_cooldown() -> u32 { 30 }

impl Rule {
    /// Validate a stored rule into its typed form.
    pub fn from_raw(raw: RawRule) -> Result<Self> {
        let cond = &raw.condition;
        let field = |key: &str| -> Result<String> {
            cond.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .ok_or_else(|| WellnudgeError::invalid_rule(&raw.name, format!("condition.{key} missing")))
        };

        let kind = field("type")?;
        let metric = field("metric")?;
        let op_str = field("op")?;
        let op = CompareOp::parse(&op_str)
            .ok_or_else(|| WellnudgeError::invalid_rule(&raw.name, format!("unknown operator '{op_str}'")))?;
        let value = cond
            .get("value")
            .and_then(MetricValue::from_json)
            .ok_or_else(|| WellnudgeError::invalid_rule(&raw.name, "condition.value missing or unsupported"))?;
        if op.needs_list() != matches!(value, MetricValue::List(_)) {
            return Err(WellnudgeError::invalid_rule(
                &raw.name,
                format!("operator '{}' does not fit value {value}", op.as_str()),
            ));
        }

        let tpl = &raw.slot_template;
        let slot_template = SlotTemplate {
            kind: tpl
                .get("type")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| kind.clone()),
            reason: tpl.get("reason").and_then(Value::as_str).unwrap_or_default().to_string(),
            action: tpl.get("action").and_then(Value::as_str).unwrap_or_default().to_string(),
        };

        Ok(Self {
            id: raw.id,
            name: raw.name,
            condition: Condition { kind, metric, op, value },
            slot_template,
            is_active: raw.is_active,
            priority: raw.priority,
            cooldown_minutes: raw.cooldown_minutes,
        })
    }
}

/// A structured trigger produced by one rule match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub rule_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(condition: Value) -> RawRule {
        RawRule {
            id: "r1".into(),
            name: "long-sitting".into(),
            condition,
            slot_template: json!({"type": "break", "reason": "sat {value} min", "action": "walk"}),
            is_active: true,
            priority: 10,
            cooldown_minutes: 60,
        }
    }

    fn metrics(pairs: &[(&str, MetricValue)]) -> BTreeMap<String, MetricValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_from_raw_validates_operator() {
        let err = Rule::from_raw(raw(json!({"type": "break", "metric": "x", "op": "~=", "value": 1})));
        assert!(matches!(err, Err(WellnudgeError::InvalidRule { .. })));

        let err = Rule::from_raw(raw(json!({"type": "break", "metric": "x", "op": "in", "value": 1})));
        assert!(err.is_err());

        let rule = Rule::from_raw(raw(json!({
            "type": "break", "metric": "continuous_max_min", "op": ">=", "value": 120
        })))
        .unwrap();
        assert_eq!(rule.condition.op, CompareOp::Ge);
        assert_eq!(rule.slot_template.kind, "break");
    }

    #[test]
    fn test_missing_metric_is_false() {
        let c = Condition {
            kind: "break".into(),
            metric: "continuous_max_min".into(),
            op: CompareOp::Ne,
            value: MetricValue::Number(0.0),
        };
        assert!(!c.evaluate(&BTreeMap::new()));
    }

    #[test]
    fn test_operators() {
        let m = metrics(&[
            ("water_progress", MetricValue::Number(0.33)),
            ("mood", MetricValue::Text("tired".into())),
            (
                "posture_issues",
                MetricValue::List(vec![MetricValue::Text("neck".into())]),
            ),
        ]);
        let cond = |metric: &str, op, value| Condition {
            kind: "k".into(),
            metric: metric.into(),
            op,
            value,
        };

        assert!(cond("water_progress", CompareOp::Lt, MetricValue::Number(0.5)).evaluate(&m));
        assert!(!cond("water_progress", CompareOp::Gt, MetricValue::Number(0.5)).evaluate(&m));
        assert!(cond("water_progress", CompareOp::Eq, MetricValue::Number(0.33)).evaluate(&m));
        assert!(cond("mood", CompareOp::Ne, MetricValue::Text("happy".into())).evaluate(&m));
        assert!(!cond("mood", CompareOp::Gt, MetricValue::Number(1.0)).evaluate(&m));

        let list = MetricValue::List(vec![
            MetricValue::Text("tired".into()),
            MetricValue::Text("neck".into()),
        ]);
        assert!(cond("mood", CompareOp::In, list.clone()).evaluate(&m));
        assert!(cond("posture_issues", CompareOp::In, list.clone()).evaluate(&m));
        assert!(!cond("posture_issues", CompareOp::NotIn, list).evaluate(&m));
    }
}
