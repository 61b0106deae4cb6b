//! Client configuration.
//!
//! `QueueConfig` tunes the offline queue; `ClientConfig` is the environment
//! driven configuration used by hosts (CLI, mobile shells) to wire the queue
//! to a backend.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, lookup_trimmed};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_OFFLINE_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_FOLLOW_UP_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_PROBE_URL: &str = "https://clients3.google.com/generate_204";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Offline queue tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Retry cap applied when `enqueue` is not given one
    pub default_max_retries: u32,
    /// Items older than this are purged regardless of status
    pub retention: Duration,
    /// Delay before re-draining after a failed reachability probe
    pub offline_retry_delay: Option<Duration>,
    /// Delay before another pass when pending items remain
    pub follow_up_delay: Option<Duration>,
    /// Spawn a drain pass after `enqueue` and `retry_failed`
    pub auto_drain: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            retention: DEFAULT_RETENTION,
            offline_retry_delay: Some(DEFAULT_OFFLINE_RETRY_DELAY),
            follow_up_delay: Some(DEFAULT_FOLLOW_UP_DELAY),
            auto_drain: true,
        }
    }
}

impl QueueConfig {
    /// Disable background scheduling; drains only happen when asked for.
    ///
    /// Suited to short-lived hosts that exit after one command.
    #[must_use]
    pub const fn manual(mut self) -> Self {
        self.offline_retry_delay = None;
        self.follow_up_delay = None;
        self.auto_drain = false;
        self
    }

    #[must_use]
    pub const fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

/// Environment-provided client settings
#[derive(Clone)]
pub struct ClientConfig {
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub probe_url: String,
    pub probe_timeout: Duration,
    pub sync_interval: Duration,
    pub queue: QueueConfig,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("probe_url", &self.probe_url)
            .field("probe_timeout", &self.probe_timeout)
            .field("sync_interval", &self.sync_interval)
            .field("queue", &self.queue)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = lookup_trimmed(&lookup, "FIREWATCH_API_BASE_URL")
            .map(|value| value.trim_end_matches('/').to_string());
        if let Some(url) = api_base_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "FIREWATCH_API_BASE_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        let api_token = lookup_trimmed(&lookup, "FIREWATCH_API_TOKEN");

        let probe_url = value_or_default(&lookup, "FIREWATCH_PROBE_URL", DEFAULT_PROBE_URL);
        if !is_http_url(&probe_url) {
            return Err(ConfigError::Invalid(
                "FIREWATCH_PROBE_URL must start with http:// or https://".to_string(),
            ));
        }

        let probe_timeout_secs = parse_in_range(
            &lookup,
            "FIREWATCH_PROBE_TIMEOUT_SECS",
            DEFAULT_PROBE_TIMEOUT.as_secs(),
            1..=60,
        )?;
        let max_retries = parse_in_range(
            &lookup,
            "FIREWATCH_QUEUE_MAX_RETRIES",
            u64::from(DEFAULT_MAX_RETRIES),
            1..=20,
        )?;
        let retention_hours = parse_in_range(
            &lookup,
            "FIREWATCH_QUEUE_RETENTION_HOURS",
            DEFAULT_RETENTION.as_secs() / 3_600,
            1..=8_760,
        )?;
        let sync_interval_secs = parse_in_range(
            &lookup,
            "FIREWATCH_SYNC_INTERVAL_SECS",
            DEFAULT_SYNC_INTERVAL.as_secs(),
            5..=3_600,
        )?;

        let queue = QueueConfig::default()
            .with_default_max_retries(u32::try_from(max_retries).unwrap_or(DEFAULT_MAX_RETRIES))
            .with_retention(Duration::from_secs(retention_hours * 3_600));

        Ok(Self {
            api_base_url,
            api_token,
            probe_url,
            probe_timeout: Duration::from_secs(probe_timeout_secs),
            sync_interval: Duration::from_secs(sync_interval_secs),
            queue,
        })
    }
}

fn parse_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = lookup_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}
