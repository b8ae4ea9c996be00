//! # config: engine settings from environment variables
//!
//! | Variable                    | Default        |
//! |-----------------------------|----------------|
//! | `RSI_INPUT_TOPIC`           | `trade-events` |
//! | `RSI_OUTPUT_TOPIC`          | `rsi-events`   |
//! | `RSI_CONSUMER_GROUP`        | `rsi-engine`   |
//! | `RSI_PARTITIONS`            | `4`            |
//! | `RSI_RECEIVE_TIMEOUT_MS`    | `1000`         |
//! | `RSI_PUBLISH_TIMEOUT_MS`    | `2000`         |
//! | `RSI_PUBLISH_MAX_RETRIES`   | `5`            |
//! | `RSI_RETRY_BACKOFF_MS`      | `100`          |
//! | `RSI_RETRY_BACKOFF_MAX_MS`  | `5000`         |
//! | `RSI_WINDOW_MODE`           | `partitioned`  |
//! | `RSI_STATS_INTERVAL_SECS`   | `30` (0 = off) |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

// ─── WindowMode ───────────────────────────────────────────────────────────────

/// How workers hold instrument windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// Each partition worker owns the windows for the keys on its partition.
    Partitioned,
    /// One store for all workers, serialized per instrument.
    Shared,
}

impl FromStr for WindowMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "partitioned" => Ok(WindowMode::Partitioned),
            "shared" => Ok(WindowMode::Shared),
            other => bail!("Unknown RSI_WINDOW_MODE: '{other}'. Use 'partitioned' or 'shared'"),
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowMode::Partitioned => write!(f, "partitioned"),
            WindowMode::Shared => write!(f, "shared"),
        }
    }
}

// ─── EngineConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub input_topic: String,
    pub output_topic: String,
    pub consumer_group: String,
    /// Partitions per topic on the in-process broker.
    pub partitions: u32,
    /// How long a worker waits for the next record before looping.
    pub receive_timeout: Duration,
    /// Budget for a single publish acknowledgement.
    pub publish_timeout: Duration,
    /// Retries after the first publish attempt before giving up on a message.
    pub publish_max_retries: u32,
    pub retry_backoff: Duration,
    pub retry_backoff_max: Duration,
    pub window_mode: WindowMode,
    /// `None` disables the periodic stats line.
    pub stats_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_topic: "trade-events".to_string(),
            output_topic: "rsi-events".to_string(),
            consumer_group: "rsi-engine".to_string(),
            partitions: 4,
            receive_timeout: Duration::from_millis(1000),
            publish_timeout: Duration::from_millis(2000),
            publish_max_retries: 5,
            retry_backoff: Duration::from_millis(100),
            retry_backoff_max: Duration::from_millis(5000),
            window_mode: WindowMode::Partitioned,
            stats_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source (environment, test map).
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| -> anyhow::Result<u64> {
            match get(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'")),
            }
        };

        let window_mode = match get("RSI_WINDOW_MODE") {
            Some(raw) => raw.parse()?,
            None => defaults.window_mode,
        };

        let stats_secs = number("RSI_STATS_INTERVAL_SECS", 30)?;

        let partitions = u32::try_from(number("RSI_PARTITIONS", u64::from(defaults.partitions))?)
            .context("RSI_PARTITIONS is out of range")?;
        let publish_max_retries = u32::try_from(number(
            "RSI_PUBLISH_MAX_RETRIES",
            u64::from(defaults.publish_max_retries),
        )?)
        .context("RSI_PUBLISH_MAX_RETRIES is out of range")?;

        let config = Self {
            input_topic: text("RSI_INPUT_TOPIC", &defaults.input_topic),
            output_topic: text("RSI_OUTPUT_TOPIC", &defaults.output_topic),
            consumer_group: text("RSI_CONSUMER_GROUP", &defaults.consumer_group),
            partitions,
            receive_timeout: Duration::from_millis(number("RSI_RECEIVE_TIMEOUT_MS", 1000)?),
            publish_timeout: Duration::from_millis(number("RSI_PUBLISH_TIMEOUT_MS", 2000)?),
            publish_max_retries,
            retry_backoff: Duration::from_millis(number("RSI_RETRY_BACKOFF_MS", 100)?),
            retry_backoff_max: Duration::from_millis(number("RSI_RETRY_BACKOFF_MAX_MS", 5000)?),
            window_mode,
            stats_interval: (stats_secs > 0).then(|| Duration::from_secs(stats_secs)),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input_topic.trim().is_empty() || self.output_topic.trim().is_empty() {
            bail!("RSI_INPUT_TOPIC and RSI_OUTPUT_TOPIC must not be empty");
        }
        if self.input_topic == self.output_topic {
            bail!("Input and output topic must differ (both '{}')", self.input_topic);
        }
        if self.consumer_group.trim().is_empty() {
            bail!("RSI_CONSUMER_GROUP must not be empty");
        }
        if self.partitions == 0 {
            bail!("RSI_PARTITIONS must be at least 1");
        }
        if self.receive_timeout.is_zero() || self.publish_timeout.is_zero() {
            bail!("Receive and publish timeouts must be greater than zero");
        }
        if self.retry_backoff > self.retry_backoff_max {
            bail!("RSI_RETRY_BACKOFF_MS must not exceed RSI_RETRY_BACKOFF_MAX_MS");
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based): doubles each time, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.retry_backoff_max)
    }
}
