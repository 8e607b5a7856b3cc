use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for testplane
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Reconciliation timing
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Controller timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ControllerConfig {
    /// Delay before a suite is reconciled again after a successful pass
    #[serde(default = "default_suite_requeue_interval_ms")]
    pub suite_requeue_interval_ms: u64,

    /// Delay before an object is reconciled again after an error
    #[serde(default = "default_error_requeue_interval_ms")]
    pub error_requeue_interval_ms: u64,

    /// How often the manager polls the store for objects to reconcile
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a timed-out test body may keep running after its
    /// cancellation token fired before its task is aborted
    #[serde(default = "default_cancel_grace_period_ms")]
    pub cancel_grace_period_ms: u64,

    /// Upper bound on retrying a worker's state merge, or a terminal status
    /// write, after version conflicts
    #[serde(default = "default_merge_retry_max_elapsed_ms")]
    pub merge_retry_max_elapsed_ms: u64,

    /// Maximum number of reconciliations of one object kind in flight at once
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,
}

const fn default_suite_requeue_interval_ms() -> u64 {
    1000
}

const fn default_error_requeue_interval_ms() -> u64 {
    1000
}

const fn default_poll_interval_ms() -> u64 {
    250
}

const fn default_cancel_grace_period_ms() -> u64 {
    5000
}

const fn default_merge_retry_max_elapsed_ms() -> u64 {
    10_000
}

const fn default_max_concurrent_reconciles() -> usize {
    16
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            suite_requeue_interval_ms: default_suite_requeue_interval_ms(),
            error_requeue_interval_ms: default_error_requeue_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            cancel_grace_period_ms: default_cancel_grace_period_ms(),
            merge_retry_max_elapsed_ms: default_merge_retry_max_elapsed_ms(),
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
        }
    }
}

impl ControllerConfig {
    pub fn suite_requeue_interval(&self) -> Duration {
        Duration::from_millis(self.suite_requeue_interval_ms)
    }

    pub fn error_requeue_interval(&self) -> Duration {
        Duration::from_millis(self.error_requeue_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cancel_grace_period(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_period_ms)
    }

    pub fn merge_retry_max_elapsed(&self) -> Duration {
        Duration::from_millis(self.merge_retry_max_elapsed_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
