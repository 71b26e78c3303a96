//! Rule matching: `DailyMetrics` + active rules → slots.

use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use wellnudge_core::error::Result;
use wellnudge_core::traits::{RecommendationRepository, RuleRepository};
use wellnudge_core::types::{DailyMetrics, Rule, Slot};

/// Placeholder in a slot reason replaced with the triggering metric value.
const VALUE_PLACEHOLDER: &str = "{value}";

pub struct RuleEngine {
    rules: Arc<dyn RuleRepository>,
    recommendations: Arc<dyn RecommendationRepository>,
}

impl RuleEngine {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        recommendations: Arc<dyn RecommendationRepository>,
    ) -> Self {
        Self {
            rules,
            recommendations,
        }
    }

    /// Match active rules (highest priority first) against a user's metrics.
    ///
    /// At most one slot per condition type; rules still in cooldown for this
    /// user are skipped.
    pub async fn match_rules(&self, user_id: &str, metrics: &DailyMetrics) -> Result<Vec<Slot>> {
        let rules = self.rules.list_active().await?;
        let values = metrics.to_metric_map();
        let mut taken: HashSet<String> = HashSet::new();
        let mut slots = Vec::new();

        for rule in rules.iter().filter(|r| r.is_active) {
            if taken.contains(&rule.condition.kind) {
                continue;
            }
            if !rule.condition.evaluate(&values) {
                continue;
            }
            if self.in_cooldown(user_id, rule).await {
                tracing::debug!("⏳ Rule '{}' in cooldown for {user_id}", rule.name);
                continue;
            }

            let value = values
                .get(&rule.condition.metric)
                .map(|v| v.to_string())
                .unwrap_or_default();
            tracing::info!("✅ Rule '{}' matched for {user_id} ({}={value})", rule.name, rule.condition.metric);

            taken.insert(rule.condition.kind.clone());
            slots.push(build_slot(rule, &value));
        }
        Ok(slots)
    }

    /// A history lookup failure counts as cooldown, so no duplicate is sent.
    async fn in_cooldown(&self, user_id: &str, rule: &Rule) -> bool {
        if rule.cooldown_minutes == 0 {
            return false;
        }
        let window = Duration::minutes(i64::from(rule.cooldown_minutes));
        match self
            .recommendations
            .recent_by_rule(user_id, &rule.id, window)
            .await
        {
            Ok(recent) => !recent.is_empty(),
            Err(e) => {
                tracing::warn!("⚠️ Cooldown lookup failed for rule '{}': {e}", rule.name);
                true
            }
        }
    }
}

fn build_slot(rule: &Rule, value: &str) -> Slot {
    let tpl = &rule.slot_template;
    Slot {
        kind: tpl.kind.clone(),
        reason: tpl.reason.replace(VALUE_PLACEHOLDER, value),
        action: tpl.action.clone(),
        rule_id: Some(rule.id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use serde_json::json;
    use wellnudge_core::memory::{InMemoryRecommendations, InMemoryRules};
    use wellnudge_core::types::{RawRule, Recommendation, RecommendationStatus};

    fn rule(id: &str, kind: &str, metric: &str, op: &str, value: serde_json::Value, priority: i32) -> Rule {
        Rule::from_raw(RawRule {
            id: id.into(),
            name: id.into(),
            condition: json!({"type": kind, "metric": metric, "op": op, "value": value}),
            slot_template: json!({"type": kind, "reason": "sat for {value} minutes", "action": "stand up"}),
            is_active: true,
            priority,
            cooldown_minutes: 60,
        })
        .unwrap()
    }

    fn metrics(continuous: f64) -> DailyMetrics {
        let mut m = DailyMetrics::empty("u1", NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), 1500.0);
        m.continuous_max_min = continuous;
        m
    }

    fn engine(rules: Vec<Rule>) -> (Arc<InMemoryRecommendations>, RuleEngine) {
        let recs = Arc::new(InMemoryRecommendations::new());
        let engine = RuleEngine::new(Arc::new(InMemoryRules::new(rules)), recs.clone());
        (recs, engine)
    }

    fn past_recommendation(rule_id: &str, minutes_ago: i64) -> Recommendation {
        Recommendation {
            id: format!("rec-{minutes_ago}"),
            user_id: "u1".into(),
            rule_id: Some(rule_id.into()),
            content: "earlier".into(),
            slots: vec![],
            context: json!({}),
            status: RecommendationStatus::Sent,
            sent_at: None,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_threshold_match_substitutes_value() {
        let (_, engine) = engine(vec![rule("r1", "break", "continuous_max_min", ">=", json!(120), 10)]);
        let slots = engine.match_rules("u1", &metrics(125.0)).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert!(slots[0].reason.contains("125"));
        assert_eq!(slots[0].rule_id.as_deref(), Some("r1"));
        assert_eq!(slots[0].action, "stand up");
    }

    #[tokio::test]
    async fn test_below_threshold_no_slot() {
        let (_, engine) = engine(vec![rule("r1", "break", "continuous_max_min", ">=", json!(120), 10)]);
        assert!(engine.match_rules("u1", &metrics(90.0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_metric_is_false() {
        // environment_noise is unreported in the metrics
        let (_, engine) = engine(vec![rule("r1", "environment", "environment_noise", ">", json!(60), 10)]);
        assert!(engine.match_rules("u1", &metrics(0.0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_match_wins_per_type() {
        let (_, engine) = engine(vec![
            rule("low", "break", "continuous_max_min", ">=", json!(60), 1),
            rule("high", "break", "continuous_max_min", ">=", json!(120), 10),
            rule("water", "hydration", "water_progress", "<", json!(0.5), 5),
        ]);
        let slots = engine.match_rules("u1", &metrics(125.0)).await.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].rule_id.as_deref(), Some("high"));
        assert_eq!(slots[1].rule_id.as_deref(), Some("water"));
    }

    #[tokio::test]
    async fn test_cooldown_blocks_then_expires() {
        let (recs, engine) = engine(vec![rule("r1", "break", "continuous_max_min", ">=", json!(120), 10)]);
        recs.insert(past_recommendation("r1", 30)).await;
        assert!(engine.match_rules("u1", &metrics(125.0)).await.unwrap().is_empty());

        let (recs, engine) = self::engine(vec![rule("r1", "break", "continuous_max_min", ">=", json!(120), 10)]);
        recs.insert(past_recommendation("r1", 61)).await;
        assert_eq!(engine.match_rules("u1", &metrics(125.0)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_blocked_rule_lets_lower_priority_fire() {
        let (recs, engine) = engine(vec![
            rule("high", "break", "continuous_max_min", ">=", json!(120), 10),
            rule("low", "break", "continuous_max_min", ">=", json!(60), 1),
        ]);
        recs.insert(past_recommendation("high", 5)).await;
        let slots = engine.match_rules("u1", &metrics(125.0)).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].rule_id.as_deref(), Some("low"));
    }

    #[tokio::test]
    async fn test_list_operator_on_posture_issues() {
        let (_, engine) = engine(vec![rule("p", "posture", "posture_issues", "in", json!(["slouch"]), 1)]);
        let mut m = metrics(0.0);
        m.posture_issues.insert("slouch".into());
        let slots = engine.match_rules("u1", &m).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].reason, "sat for [slouch] minutes");
    }
}
