//! Message generation: slots → rendered reminders.
//!
//! The LLM is asked for strict JSON `{"messages": [...]}`. Any provider
//! failure or unusable reply degrades to a fixed template for the slot type.

use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use wellnudge_core::config::WellnudgeConfig;
use wellnudge_core::traits::GenerateParams;
use wellnudge_core::types::{
    ChatMessage, DailyMetrics, HealthContext, MetricValue, RecommendationDraft, Slot, UserProfile,
};
use wellnudge_providers::openai_compatible::DEFAULT_SYSTEM_PROMPT as SYSTEM_PROMPT;
use wellnudge_providers::{ProviderRouter, is_error};

use crate::stats::{GenerationStats, Outcome};

/// Slot type used for health alerts raised by the status job.
pub const HEALTH_ALERT_KIND: &str = "health_alert";

pub struct RecommendationGenerator {
    router: Arc<ProviderRouter>,
    params: GenerateParams,
    default_style: String,
    stats: Arc<GenerationStats>,
}

impl RecommendationGenerator {
    pub fn new(router: Arc<ProviderRouter>, config: &WellnudgeConfig) -> Self {
        Self {
            router,
            params: GenerateParams {
                model: config.llm.model.clone(),
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
            },
            default_style: config.default_message_style.clone(),
            stats: Arc::new(GenerationStats::new()),
        }
    }

    pub fn stats(&self) -> &Arc<GenerationStats> {
        &self.stats
    }

    /// Render one draft per slot. Never fails; bad replies use templates.
    pub async fn generate(
        &self,
        profile: &UserProfile,
        slots: &[Slot],
        metrics: &DailyMetrics,
    ) -> Vec<RecommendationDraft> {
        if slots.is_empty() {
            tracing::debug!("💤 No slots to generate for {}", profile.user_id);
            return Vec::new();
        }
        let style = profile.message_style().unwrap_or(&self.default_style);
        let facts = render_facts(metrics);

        let mut drafts = Vec::with_capacity(slots.len());
        for slot in slots {
            let messages = build_prompt(&facts, slot, style);
            let reply = self.router.chat(&messages, &self.params, true).await;

            let (draft, outcome) = if is_error(&reply) {
                tracing::warn!("⚠️ Generation failed for {} slot: {reply}", slot.kind);
                (fallback_draft(slot), Outcome::Error)
            } else {
                match parse_messages(&reply) {
                    Some(content) => (
                        RecommendationDraft {
                            content,
                            slot: slot.clone(),
                            context: json!({
                                "generated_at": Utc::now().to_rfc3339(),
                                "response": reply,
                            }),
                        },
                        Outcome::Success,
                    ),
                    None => {
                        tracing::warn!("⚠️ Unusable LLM reply for {} slot, using template", slot.kind);
                        (fallback_draft(slot), Outcome::Fallback)
                    }
                }
            };
            self.stats.record(&slot.kind, outcome);
            drafts.push(draft);
        }
        drafts
    }

    /// Ad hoc reminder for a user who has been busy for too long.
    ///
    /// Plain-text replies are accepted; a JSON `messages` reply is honoured.
    pub async fn health_alert(&self, ctx: &HealthContext) -> RecommendationDraft {
        let slot = Slot {
            kind: HEALTH_ALERT_KIND.to_string(),
            reason: format!("online for {} minutes", ctx.online_minutes),
            action: "stretch and drink water".to_string(),
            rule_id: None,
        };
        let facts = json!({
            "employee_info": {
                "name": ctx.profile.name,
                "title": ctx.profile.title,
                "extension": ctx.profile.extension,
            },
            "weather": ctx.weather,
            "work_status": ctx.schedule,
            "steps": ctx.steps.as_ref().map(|s| s.steps),
            "online_minutes": ctx.online_minutes,
        });
        let style = ctx.profile.message_style().unwrap_or(&self.default_style);
        let messages = vec![
            ChatMessage::system(format!(
                "{SYSTEM_PROMPT} Current time: {}. Write one short, friendly health reminder.",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            )),
            ChatMessage::user(format!(
                "Employee health data:\n{facts}\nSTYLE: {style}"
            )),
        ];

        let reply = self.router.chat(&messages, &self.params, true).await;
        let content = if is_error(&reply) {
            None
        } else {
            parse_messages(&reply).or_else(|| {
                let text = reply.trim();
                (!text.is_empty()).then(|| text.to_string())
            })
        };

        let mut context = json!({
            "kind": HEALTH_ALERT_KIND,
            "online_minutes": ctx.online_minutes,
            "generated_at": Utc::now().to_rfc3339(),
        });
        match content {
            Some(content) => {
                self.stats.record(HEALTH_ALERT_KIND, Outcome::Success);
                RecommendationDraft { content, slot, context }
            }
            None => {
                tracing::warn!("⚠️ Health alert for {} uses template: {reply}", ctx.profile.user_id);
                self.stats.record(HEALTH_ALERT_KIND, Outcome::Fallback);
                context["is_fallback"] = Value::Bool(true);
                RecommendationDraft {
                    content: health_template(ctx),
                    slot,
                    context,
                }
            }
        }
    }
}

/// `key=value` pairs joined by "; ". Text and list values are quoted.
pub fn render_facts(metrics: &DailyMetrics) -> String {
    metrics
        .to_metric_map()
        .iter()
        .map(|(k, v)| match v {
            MetricValue::Number(_) => format!("{k}={v}"),
            _ => format!("{k}=\"{v}\""),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn build_prompt(facts: &str, slot: &Slot, style: &str) -> Vec<ChatMessage> {
    let mut slot_line = format!("{}:{}", slot.kind, slot.reason);
    if !slot.action.is_empty() {
        slot_line.push_str(&format!("|action:{}", slot.action));
    }
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "FACTS: {facts}\nSLOTS: {slot_line}\nSTYLE: {style}\nOUTPUT: JSON {{\"messages\":[\"...\"]}}"
        )),
    ]
}

/// Extract the outermost `{...}` and read its non-empty `messages` array.
pub fn parse_messages(reply: &str) -> Option<String> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let value: Value = serde_json::from_str(&reply[start..=end]).ok()?;
    let items = value.as_object()?.get("messages")?.as_array()?;
    if items.is_empty() {
        return None;
    }
    let lines = items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()?;
    Some(lines.join("\n"))
}

pub fn fallback_content(slot: &Slot) -> String {
    let reason = &slot.reason;
    match slot.kind.as_str() {
        "break" => format!("Reminder: {reason}. Suggestion: {}.", slot.action),
        "hydration" => format!("Reminder: {reason}. Drink some water to stay hydrated."),
        "posture" => format!(
            "Reminder: {reason}. Sit upright and avoid holding one posture for too long."
        ),
        "environment" => format!(
            "Reminder: {reason}. Adjust your surroundings for more comfortable working conditions."
        ),
        _ => format!("Health reminder: {reason}. {}", slot.action)
            .trim_end()
            .to_string(),
    }
}

fn fallback_draft(slot: &Slot) -> RecommendationDraft {
    RecommendationDraft {
        content: fallback_content(slot),
        slot: slot.clone(),
        context: json!({
            "generated_at": Utc::now().to_rfc3339(),
            "is_fallback": true,
        }),
    }
}

fn health_template(ctx: &HealthContext) -> String {
    let name = if ctx.profile.name.is_empty() {
        "there"
    } else {
        ctx.profile.name.as_str()
    };
    let mut text = format!(
        "Hi {name}, you have been busy for {} minutes. Stand up, stretch for a few minutes and drink a glass of water.",
        ctx.online_minutes
    );
    if let Some(t) = ctx.weather.as_ref().and_then(|w| w.temperature) {
        text.push_str(&format!(" It is {t}°C outside today."));
    }
    text
}
