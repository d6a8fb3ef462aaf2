//! Quizcast configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{QuizcastError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizcastConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl QuizcastConfig {
    /// Load config from the default path (~/.quizcast/config.toml).
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
            .map_err(|e| QuizcastError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| QuizcastError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| QuizcastError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Quizcast home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".quizcast")
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Overridable for tests and local API servers.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Long-poll timeout for getUpdates, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".into()
}
fn default_poll_timeout() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// Scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Send interval for groups without their own override.
    #[serde(default = "default_interval")]
    pub default_interval_secs: u64,
    /// How often the scheduler scans for due groups.
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
}

fn default_interval() -> u64 {
    3600
}
fn default_tick() -> u64 {
    5
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_interval(),
            tick_secs: default_tick(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path. None uses ~/.quizcast/quizcast.db.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Skip the durable backend entirely (volatile, for throwaway runs).
    #[serde(default)]
    pub memory_only: bool,
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| QuizcastConfig::home_dir().join("quizcast.db"))
    }
}

/// Delivery configuration — retries, timeouts, rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,
    /// Per-request timeout on outbound sends, in seconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    #[serde(default)]
    pub rate: RateLimitConfig,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    500
}
fn default_backoff_cap() -> u64 {
    30_000
}
fn default_send_timeout() -> u64 {
    10
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            send_timeout_secs: default_send_timeout(),
            rate: RateLimitConfig::default(),
        }
    }
}

/// Process-wide outbound rate limit (the API enforces its own on top).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_minute")]
    pub max_messages_per_minute: u32,
    /// Bucket capacity: how many sends may go out back-to-back.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_per_minute() -> u32 {
    20
}
fn default_burst() -> u32 {
    5
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages_per_minute: default_per_minute(),
            burst: default_burst(),
        }
    }
}

/// Admin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Always-sudo root user; additional sudo users live in the store.
    #[serde(default)]
    pub root_user_id: Option<i64>,
    /// Explanation text attached to every quiz poll.
    #[serde(default = "default_explanation")]
    pub quiz_explanation: String,
}

fn default_explanation() -> String {
    "Check back later for results!".into()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            root_user_id: None,
            quiz_explanation: default_explanation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QuizcastConfig::default();
        assert_eq!(config.schedule.default_interval_secs, 3600);
        assert_eq!(config.schedule.tick_secs, 5);
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.delivery.rate.max_messages_per_minute, 20);
        assert!(config.telegram.bot_token.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [telegram]
            bot_token = "123:abc"

            [schedule]
            default_interval_secs = 1800

            [admin]
            root_user_id = 99
        "#;

        let config: QuizcastConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.schedule.default_interval_secs, 1800);
        assert_eq!(config.admin.root_user_id, Some(99));
        // Untouched sections keep their defaults.
        assert_eq!(config.delivery.send_timeout_secs, 10);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: QuizcastConfig = toml::from_str("").unwrap();
        assert_eq!(config.schedule.default_interval_secs, 3600);
        assert_eq!(config.delivery.rate.burst, 5);
        assert_eq!(config.admin.quiz_explanation, "Check back later for results!");
    }

    #[test]
    fn test_db_path_override() {
        let storage = StorageConfig {
            path: Some(PathBuf::from("/tmp/custom.db")),
            memory_only: false,
        };
        assert_eq!(storage.db_path(), PathBuf::from("/tmp/custom.db"));
        let default = StorageConfig::default();
        assert!(default.db_path().ends_with("quizcast.db"));
    }
}
