//! DingTalk group-robot delivery.
//!
//! Messages are POSTed to the robot webhook. When a signing secret is set,
//! the request carries `timestamp` + `sign` (HMAC-SHA256 over
//! `"{timestamp}\n{secret}"`, base64). Transport failures map to `errcode = -1`.

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use std::time::Duration;
use wellnudge_core::config::DeliveryConfig;
use wellnudge_core::error::{Result, WellnudgeError};
use wellnudge_core::traits::Delivery;
use wellnudge_core::types::DeliveryReceipt;

type HmacSha256 = Hmac<Sha256>;

pub struct DingTalkRobot {
    token: String,
    secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl DingTalkRobot {
    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WellnudgeError::Delivery(format!("client build failed: {e}")))?;
        Ok(Self {
            token: config.resolved_token(),
            secret: config.resolved_secret(),
            base_url: config.base_url.clone(),
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.token.is_empty()
    }

    /// Query parameters for one request.
    fn query(&self, timestamp_ms: i64) -> Result<Vec<(&'static str, String)>> {
        let mut params = vec![("access_token", self.token.clone())];
        if !self.secret.is_empty() {
            params.push(("timestamp", timestamp_ms.to_string()));
            params.push(("sign", sign(timestamp_ms, &self.secret)?));
        }
        Ok(params)
    }

    async fn post(&self, kind: &str, message: Value) -> DeliveryReceipt {
        if !self.is_configured() {
            tracing::warn!("⚠️ DingTalk robot token not configured, {kind} message dropped");
            return DeliveryReceipt::failed("robot token not configured");
        }
        let query = match self.query(chrono::Utc::now().timestamp_millis()) {
            Ok(q) => q,
            Err(e) => return DeliveryReceipt::failed(e.to_string()),
        };

        let resp = match self
            .client
            .post(&self.base_url)
            .query(&query)
            .json(&message)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("❌ DingTalk {kind} send failed: {e}");
                return DeliveryReceipt::failed(format!("DingTalk send failed: {e}"));
            }
        };

        let status = resp.status();
        let receipt = match resp.json::<DeliveryReceipt>().await {
            Ok(r) => r,
            Err(e) => DeliveryReceipt::failed(format!("DingTalk response {status}: {e}")),
        };
        if receipt.is_success() {
            tracing::info!("✅ DingTalk {kind} message sent");
        } else {
            tracing::warn!(
                "⚠️ DingTalk {kind} rejected: errcode={} errmsg={}",
                receipt.errcode,
                receipt.errmsg.as_deref().unwrap_or("")
            );
        }
        receipt
    }
}

/// base64(HMAC-SHA256(secret, "{timestamp}\n{secret}")).
pub fn sign(timestamp_ms: i64, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WellnudgeError::Delivery(format!("invalid signing key: {e}")))?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn text_message(content: &str) -> Value {
    json!({
        "msgtype": "text",
        "text": { "content": content },
        "at": { "atMobiles": [], "isAtAll": false },
    })
}

pub fn markdown_message(title: &str, content: &str) -> Value {
    json!({
        "msgtype": "markdown",
        "markdown": { "title": title, "text": content },
        "at": { "atMobiles": [], "isAtAll": false },
    })
}

#[async_trait]
impl Delivery for DingTalkRobot {
    async fn send_text(&self, content: &str) -> DeliveryReceipt {
        self.post("text", text_message(content)).await
    }

    async fn send_markdown(&self, title: &str, content: &str) -> DeliveryReceipt {
        self.post("markdown", markdown_message(title, content)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robot(token: &str, secret: &str) -> DingTalkRobot {
        DingTalkRobot {
            token: token.into(),
            secret: secret.into(),
            base_url: "http://127.0.0.1:9/robot/send".into(),
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn test_sign_is_deterministic_base64() {
        let a = sign(1_700_000_000_000, "SECxyz").unwrap();
        let b = sign(1_700_000_000_000, "SECxyz").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, sign(1_700_000_000_001, "SECxyz").unwrap());
        let raw = base64::engine::general_purpose::STANDARD.decode(&a).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn test_query_with_and_without_secret() {
        let q = robot("tok", "").query(1).unwrap();
        assert_eq!(q, vec![("access_token", "tok".to_string())]);

        let q = robot("tok", "sec").query(42).unwrap();
        assert_eq!(q.len(), 3);
        assert_eq!(q[1], ("timestamp", "42".to_string()));
        assert_eq!(q[2].0, "sign");
    }

    #[test]
    fn test_message_shapes() {
        assert_eq!(text_message("hi")["text"]["content"], "hi");
        let md = markdown_message("Health", "## stand up");
        assert_eq!(md["msgtype"], "markdown");
        assert_eq!(md["markdown"]["title"], "Health");
    }

    #[tokio::test]
    async fn test_unconfigured_and_unreachable_fail() {
        let r = robot("", "").send_text("hi").await;
        assert_eq!(r.errcode, -1);

        let r = robot("tok", "sec").send_text("hi").await;
        assert_eq!(r.errcode, -1);
        assert!(!r.is_success());
    }
}
