//! Configuration management for reconmap.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (RECONMAP__ prefix, `__` separator)
//! 2. Config file (reconmap.toml)
//! 3. Defaults

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ReconError, Result};

/// Top-level client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    /// Base URL of the scan backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token attached to backend requests when set.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request timeout for scan submission and status calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub poll: PollConfig,

    /// Directory for the local scan journal. Journaling is off when unset.
    #[serde(default)]
    pub journal_dir: Option<String>,
}

/// Backend liveness probing.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,

    /// Liveness endpoint path.
    #[serde(default = "default_health_path")]
    pub path: String,
}

/// Transport retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each subsequent retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Status polling.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,

    /// Give up on a job after this long. `0` polls until the backend answers.
    #[serde(default = "default_max_poll_secs")]
    pub max_duration_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_health_interval() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    10
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_poll_secs() -> u64 {
    1800
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            request_timeout_secs: default_request_timeout(),
            health: HealthConfig::default(),
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
            journal_dir: None,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            timeout_secs: default_health_timeout(),
            path: default_health_path(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_duration_secs: default_max_poll_secs(),
        }
    }
}

impl ReconConfig {
    /// Load configuration from `{file_prefix}.toml` (optional) and the environment.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("RECONMAP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = cfg.try_deserialize()?;
        loaded.validate()?;
        tracing::debug!(base_url = %loaded.base_url, "Configuration loaded");
        Ok(loaded)
    }

    /// Reject values the background timers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_ms == 0 {
            return Err(ReconError::Config(
                "poll.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.health.interval_secs == 0 {
            return Err(ReconError::Config(
                "health.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl HealthConfig {
    /// Never zero; a zero period would panic the probe timer.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PollConfig {
    /// Never zero; a zero period would panic the poll timer.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_secs > 0).then(|| Duration::from_secs(self.max_duration_secs))
    }
}
