use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

/// Client-wide settings for the request pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub user_agent: String,
    /// How often a rate-limited request is retried before the error surfaces
    pub max_rate_limit_retries: u32,
    /// Default response timeout of an action, none when unset
    pub request_timeout_secs: Option<u64>,
    /// Backoff used when a 429 carries no retry hint
    pub global_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: format!(
                "DiscordBot (https://github.com/guildcore, {})",
                env!("CARGO_PKG_VERSION")
            ),
            max_rate_limit_retries: 3,
            request_timeout_secs: None,
            global_backoff_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ClientError::ConfigLoad {
            path: path.to_string(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| ClientError::ConfigParse {
            path: path.to_string(),
            source: e,
        })
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            max_rate_limit_retries: std::env::var("MAX_RATE_LIMIT_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_rate_limit_retries),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(defaults.request_timeout_secs),
            ..defaults
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn global_backoff(&self) -> Duration {
        Duration::from_millis(self.global_backoff_ms)
    }
}
