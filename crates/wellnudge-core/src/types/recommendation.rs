//! Generated recommendations and their delivery lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::rule::Slot;

/// Delivery status. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Created,
    Sent,
    Failed,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Created => "created",
            RecommendationStatus::Sent => "sent",
            RecommendationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => RecommendationStatus::Sent,
            "failed" => RecommendationStatus::Failed,
            _ => RecommendationStatus::Created,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecommendationStatus::Created)
    }
}

/// A persisted recommendation. `created_at` anchors the rule cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub user_id: String,
    pub rule_id: Option<String>,
    pub content: String,
    pub slots: Vec<Slot>,
    pub context: Value,
    pub status: RecommendationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Data needed to create a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecommendation {
    pub user_id: String,
    pub rule_id: Option<String>,
    pub content: String,
    pub slots: Vec<Slot>,
    pub context: Value,
}

/// Rendered message for one slot, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationDraft {
    pub content: String,
    pub slot: Slot,
    /// Generation context; carries `"is_fallback": true` when a template was used.
    pub context: Value,
}

impl RecommendationDraft {
    pub fn is_fallback(&self) -> bool {
        self.context
            .get("is_fallback")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn into_new(self, user_id: &str) -> NewRecommendation {
        NewRecommendation {
            user_id: user_id.to_string(),
            rule_id: self.slot.rule_id.clone(),
            content: self.content,
            slots: vec![self.slot],
            context: self.context,
        }
    }
}

/// Response of the messaging channel. `errcode != 0` is a failed delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: Option<String>,
}

impl DeliveryReceipt {
    pub fn ok() -> Self {
        Self { errcode: 0, errmsg: None }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            errcode: -1,
            errmsg: Some(msg.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errcode == 0
    }
}
