use std::{path::{Path, PathBuf}, time::Duration};

use channel_integration::PhoenixConfig;
use client_core::{RetryPolicy, SessionConfig};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use url::Url;

pub const ENV_PREFIX: &str = "DRAB_AGENT";
/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_NAME: &str = "agent";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub endpoint: String,
    pub token: Option<String>,
    pub path: String,
    pub return_mode: String,
    pub page: Option<PathBuf>,
    pub heartbeat_interval_ms: u64,
    pub reply_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            endpoint: "ws://127.0.0.1:4000/drab/socket".into(),
            token: None,
            path: "/".into(),
            return_mode: String::new(),
            page: None,
            heartbeat_interval_ms: 30_000,
            reply_timeout_ms: 10_000,
            retry_max_attempts: retry.max_attempts,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            retry_max_delay_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

impl AgentSettings {
    pub fn phoenix_config(&self) -> Result<PhoenixConfig, url::ParseError> {
        let mut config = PhoenixConfig::new(Url::parse(&self.endpoint)?);
        if let Some(token) = &self.token {
            config = config.with_token(token.clone());
        }
        config.heartbeat_interval = Duration::from_millis(self.heartbeat_interval_ms);
        config.reply_timeout = Duration::from_millis(self.reply_timeout_ms);
        Ok(config)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.path.clone())
            .with_return_mode(self.return_mode.clone())
            .with_retry(RetryPolicy {
                max_attempts: self.retry_max_attempts,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
            })
    }
}

/// Defaults, then `agent.toml` (or the given file, which must exist), then
/// `DRAB_AGENT_*` environment variables.
pub fn load_settings(path: Option<&Path>) -> Result<AgentSettings, ConfigError> {
    load_settings_with_env(path, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
}

pub(crate) fn load_settings_with_env(
    path: Option<&Path>,
    environment: Environment,
) -> Result<AgentSettings, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
    };
    Config::builder()
        .add_source(file)
        .add_source(environment)
        .build()?
        .try_deserialize()
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
