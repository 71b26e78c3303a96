//! Wellnudge configuration system.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, WellnudgeError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellnudgeConfig {
    #[serde(default = "default_message_style")]
    pub default_message_style: String,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub attendance: AttendanceConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_message_style() -> String { "concise, bulleted".into() }

impl Default for WellnudgeConfig {
    fn default() -> Self {
        Self {
            default_message_style: default_message_style(),
            llm: LlmConfig::default(),
            aggregation: AggregationConfig::default(),
            attendance: AttendanceConfig::default(),
            scheduler: SchedulerConfig::default(),
            delivery: DeliveryConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WellnudgeConfig {
    /// Load config from the default path (~/.wellnudge/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WellnudgeError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| WellnudgeError::Config(format!("Failed to parse config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Wellnudge home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wellnudge")
    }
}

/// LLM routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Primary provider name.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Providers tried after the primary, in order.
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-provider API keys. Env vars from the registry fill in missing ones.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    /// Per-provider base URL overrides.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

fn default_provider() -> String { "openai".into() }
fn default_fallback_order() -> Vec<String> {
    vec!["openai", "deepseek", "tongyi"]
        .into_iter().map(String::from).collect()
}
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 512 }
fn default_timeout_secs() -> u64 { 30 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            fallback_order: default_fallback_order(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_keys: HashMap::new(),
            endpoints: HashMap::new(),
        }
    }
}

/// Daily aggregation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Max gap between two WORK events that still counts as one session.
    #[serde(default = "default_gap_tolerance")]
    pub gap_tolerance_secs: i64,
    #[serde(default = "default_water_target")]
    pub water_target_ml: f64,
}

fn default_gap_tolerance() -> i64 { 300 }
fn default_water_target() -> f64 { 1500.0 }

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            gap_tolerance_secs: default_gap_tolerance(),
            water_target_ml: default_water_target(),
        }
    }
}

/// Check-in / check-out windows, in local hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceConfig {
    #[serde(default = "default_check_in_start")]
    pub check_in_start_hour: u32,
    #[serde(default = "default_window_end")]
    pub check_in_end_hour: u32,
    #[serde(default = "default_check_out_start")]
    pub check_out_start_hour: u32,
    #[serde(default = "default_window_end")]
    pub check_out_end_hour: u32,
    /// Offset of the local business day from UTC.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

fn default_check_in_start() -> u32 { 8 }
fn default_check_out_start() -> u32 { 18 }
fn default_window_end() -> u32 { 22 }
fn default_utc_offset() -> i32 { 8 }

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            check_in_start_hour: default_check_in_start(),
            check_in_end_hour: default_window_end(),
            check_out_start_hour: default_check_out_start(),
            check_out_end_hour: default_window_end(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

/// Job intervals and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_attendance_interval")]
    pub attendance_interval_secs: u64,
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    #[serde(default = "default_status_delay")]
    pub status_initial_delay_secs: u64,
    #[serde(default = "default_pipeline_interval")]
    pub pipeline_interval_secs: u64,
    #[serde(default = "default_online_threshold")]
    pub online_threshold_min: i64,
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default = "default_city")]
    pub default_city: String,
}

fn default_attendance_interval() -> u64 { 3600 }
fn default_status_interval() -> u64 { 7200 }
fn default_status_delay() -> u64 { 5 }
fn default_pipeline_interval() -> u64 { 3600 }
fn default_online_threshold() -> i64 { 90 }
fn default_city() -> String { "Hangzhou".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            attendance_interval_secs: default_attendance_interval(),
            status_interval_secs: default_status_interval(),
            status_initial_delay_secs: default_status_delay(),
            pipeline_interval_secs: default_pipeline_interval(),
            online_threshold_min: default_online_threshold(),
            user_ids: Vec::new(),
            default_city: default_city(),
        }
    }
}

/// DingTalk robot delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub robot_token: String,
    #[serde(default)]
    pub sign_secret: String,
    #[serde(default = "default_robot_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_robot_url() -> String { "https://oapi.dingtalk.com/robot/send".into() }

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            robot_token: String::new(),
            sign_secret: String::new(),
            base_url: default_robot_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DeliveryConfig {
    /// Robot token from config, falling back to `DINGTALK_ROBOT_TOKEN`.
    pub fn resolved_token(&self) -> String {
        if !self.robot_token.is_empty() {
            return self.robot_token.clone();
        }
        std::env::var("DINGTALK_ROBOT_TOKEN").unwrap_or_default()
    }

    /// Signing secret from config, falling back to `DINGTALK_SIGN_SECRET`.
    pub fn resolved_secret(&self) -> String {
        if !self.sign_secret.is_empty() {
            return self.sign_secret.clone();
        }
        std::env::var("DINGTALK_SIGN_SECRET").unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.wellnudge/wellnudge.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WellnudgeConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.fallback_order, vec!["openai", "deepseek", "tongyi"]);
        assert!((config.llm.temperature - 0.7).abs() < 0.01);
        assert_eq!(config.aggregation.gap_tolerance_secs, 300);
        assert_eq!(config.scheduler.online_threshold_min, 90);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            default_message_style = "short"

            [llm]
            provider = "deepseek"
            fallback_order = ["deepseek", "openai"]

            [attendance]
            check_in_start_hour = 7

            [scheduler]
            user_ids = ["u1", "u2"]
        "#;

        let config = WellnudgeConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.default_message_style, "short");
        assert_eq!(config.llm.provider, "deepseek");
        assert_eq!(config.llm.max_tokens, 512);
        assert_eq!(config.attendance.check_in_start_hour, 7);
        assert_eq!(config.attendance.check_out_start_hour, 18);
        assert_eq!(config.scheduler.user_ids.len(), 2);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config = WellnudgeConfig::from_toml("").unwrap();
        assert_eq!(config.aggregation.water_target_ml, 1500.0);
        assert_eq!(config.delivery.base_url, "https://oapi.dingtalk.com/robot/send");
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = WellnudgeConfig::from_toml("[llm\nprovider=").unwrap_err();
        assert!(matches!(err, WellnudgeError::Config(_)));
    }

    #[test]
    fn test_home_dir() {
        let home = WellnudgeConfig::home_dir();
        assert!(home.to_string_lossy().contains("wellnudge"));
    }
}
