//! Validated runtime settings derived from the command line.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::types::Selector;

/// Exponential backoff for transient cluster failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorSettings {
    /// Re-list even without watch events after this long.
    pub resync_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamerSettings {
    pub container: Option<String>,
    /// Minimum delay between two stream opens for the same pod.
    pub cooldown: Duration,
    pub buffer_size: usize,
    pub tail_lines: Option<i64>,
}

impl Default for StreamerSettings {
    fn default() -> Self {
        Self {
            container: None,
            cooldown: Duration::from_secs(5),
            buffer_size: 10_000_000,
            tail_lines: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TailConfig {
    pub selector: Selector,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub locator: LocatorSettings,
    pub streamer: StreamerSettings,
}

impl TryFrom<&Cli> for TailConfig {
    type Error = ConfigError;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let labels = cli.labels.trim();
        if labels.is_empty() {
            return Err(ConfigError::MissingSelector);
        }
        let namespace = cli.namespace.trim();
        if namespace.is_empty() {
            return Err(ConfigError::MissingNamespace);
        }
        if cli.resync_interval == 0 {
            return Err(ConfigError::InvalidSetting {
                flag: "resync-interval",
                reason: "must be at least one second".to_string(),
            });
        }
        if cli.cooldown == 0 {
            return Err(ConfigError::InvalidSetting {
                flag: "cooldown",
                reason: "must be at least one second".to_string(),
            });
        }
        if cli.buffer_size == 0 {
            return Err(ConfigError::InvalidSetting {
                flag: "buffer-size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(tail) = cli.tail
            && tail < 0
        {
            return Err(ConfigError::InvalidSetting {
                flag: "tail",
                reason: format!("{} is negative", tail),
            });
        }
        let container = cli
            .container
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from);

        Ok(Self {
            selector: Selector {
                namespace: namespace.to_string(),
                labels: labels.to_string(),
            },
            kubeconfig: cli.kubeconfig.clone(),
            context: cli.context.clone(),
            locator: LocatorSettings {
                resync_interval: Duration::from_secs(cli.resync_interval),
                retry: RetryPolicy::default(),
            },
            streamer: StreamerSettings {
                container,
                cooldown: Duration::from_secs(cli.cooldown),
                buffer_size: cli.buffer_size,
                tail_lines: cli.tail,
            },
        })
    }
}
