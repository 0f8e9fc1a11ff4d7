use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::api::RetryPolicy;
use crate::jobs::DeviceFilterConfig;

pub const CONFIG_FILE: &str = "floto.toml";
pub const ENV_PREFIX: &str = "FLOTO_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 1000,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Used to mark resources created by the current user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub retry: RetryConfig,
    pub device_filter: DeviceFilterConfig,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            api_token: None,
            user_email: None,
            project: None,
            retry: RetryConfig::default(),
            device_filter: DeviceFilterConfig::default(),
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load defaults, then `floto.toml`, then `FLOTO_*` variables, then `overrides`.
    pub fn new<T: Serialize>(overrides: Option<&T>) -> Result<Self, figment::Error> {
        Self::figment(CONFIG_FILE, overrides).extract()
    }

    pub fn figment<T: Serialize>(path: impl AsRef<Path>, overrides: Option<&T>) -> Figment {
        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        match overrides {
            Some(overrides) => figment.merge(Serialized::defaults(overrides)),
            None => figment,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}
