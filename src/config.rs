//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every field has a default, so an empty file (or no file at all) yields
//! the stock 30-second poller against a local server. The session cookie
//! is referenced by env-var name and resolved at runtime.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default polling period.
pub const DEFAULT_INTERVAL_SECS: u64 = 30;
/// Resource path that reports the current user's balance.
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/user_coins";
/// Element id the balance is rendered into.
pub const DEFAULT_TARGET_ID: &str = "coin-count";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub poller: PollerConfig,
    pub endpoint: EndpointConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_secs: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// What the scheduled loop does with a failed refresh.
///
/// The display keeps its last value under every policy.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Drop the error without a trace.
    Ignore,
    /// Emit a warning through `tracing`.
    #[default]
    Log,
    /// Log, and broadcast the failure to subscribers.
    Surface,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: String,
    pub path: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Name of the env var holding the server's `session` cookie value.
    pub session_cookie_env: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            path: DEFAULT_ENDPOINT_PATH.to_string(),
            timeout_secs: 10,
            user_agent: concat!("coinpoll/", env!("CARGO_PKG_VERSION")).to_string(),
            session_cookie_env: None,
        }
    }
}

impl EndpointConfig {
    /// Full URL of the balance resource.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    /// Resolve the session cookie, if one is configured and set.
    pub fn session_cookie(&self) -> Option<SecretString> {
        self.session_cookie_env
            .as_deref()
            .and_then(|env| AppConfig::resolve_env(env).ok())
            .filter(|v| !v.is_empty())
            .map(SecretString::new)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub target_id: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            target_id: DEFAULT_TARGET_ID.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poller.interval_secs == 0 {
            anyhow::bail!("poller.interval_secs must be greater than zero");
        }
        if self.endpoint.timeout_secs == 0 {
            anyhow::bail!("endpoint.timeout_secs must be greater than zero");
        }
        if !self.endpoint.base_url.starts_with("http://")
            && !self.endpoint.base_url.starts_with("https://")
        {
            anyhow::bail!(
                "endpoint.base_url must be an http(s) URL, got {:?}",
                self.endpoint.base_url
            );
        }
        if self.display.target_id.trim().is_empty() {
            anyhow::bail!("display.target_id must not be empty");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
