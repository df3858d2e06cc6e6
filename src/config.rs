//! Orchestrator configuration loaded from TOML.
//!
//! Every field has a default so an empty document is a valid
//! configuration:
//!
//! ```toml
//! [scheduler]
//! task_interval_ms = 1000
//! check_interval_ms = 1000
//! max_instance_connections = 10
//! run_threshold = "warn"
//! auto_approve_threshold = "success"
//! affected_rows_warn_above = 1000
//!
//! [logging]
//! filter = "info"
//! format = "text"
//! ```

use crate::pipeline::domain::TaskCheckStatus;
use crate::taskcheck::executors::DEFAULT_AFFECTED_ROWS_WARN_ABOVE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {field} {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Scheduler loops and admission.
    pub scheduler: SchedulerConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl OrchestratorConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// as [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = path.as_ref();
        let content = std::fs::read_to_string(file).map_err(|source| ConfigError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero intervals, a zero
    /// connection cap, or a blank log filter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "logging.filter",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    /// Replaces the scheduler section.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Replaces the logging section.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

/// Scheduler loop and admission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Task scheduler tick, in milliseconds.
    pub task_interval_ms: u64,
    /// Check scheduler tick, in milliseconds.
    pub check_interval_ms: u64,
    /// Outstanding task and check workers allowed per instance.
    pub max_instance_connections: usize,
    /// Most severe check result that still lets a task run.
    pub run_threshold: SeverityThreshold,
    /// Most severe check result that still allows automatic approval.
    pub auto_approve_threshold: SeverityThreshold,
    /// Estimated row count above which a data change is reported as a
    /// warning.
    pub affected_rows_warn_above: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_interval_ms: 1_000,
            check_interval_ms: 1_000,
            max_instance_connections: 10,
            run_threshold: SeverityThreshold::Warn,
            auto_approve_threshold: SeverityThreshold::Success,
            affected_rows_warn_above: DEFAULT_AFFECTED_ROWS_WARN_ABOVE,
        }
    }
}

impl SchedulerConfig {
    /// Returns the task scheduler tick.
    #[must_use]
    pub const fn task_interval(&self) -> Duration {
        Duration::from_millis(self.task_interval_ms)
    }

    /// Returns the check scheduler tick.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Sets both ticks.
    #[must_use]
    pub fn with_intervals(mut self, interval: Duration) -> Self {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        self.task_interval_ms = millis;
        self.check_interval_ms = millis;
        self
    }

    /// Sets the per-instance worker cap.
    #[must_use]
    pub fn with_max_instance_connections(mut self, max: usize) -> Self {
        self.max_instance_connections = max;
        self
    }

    /// Sets the run threshold.
    #[must_use]
    pub fn with_run_threshold(mut self, threshold: SeverityThreshold) -> Self {
        self.run_threshold = threshold;
        self
    }

    /// Sets the automatic approval threshold.
    #[must_use]
    pub fn with_auto_approve_threshold(mut self, threshold: SeverityThreshold) -> Self {
        self.auto_approve_threshold = threshold;
        self
    }

    /// Sets the affected-row warning limit.
    #[must_use]
    pub fn with_affected_rows_warn_above(mut self, rows: u64) -> Self {
        self.affected_rows_warn_above = rows;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.task_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.task_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.check_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.check_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.max_instance_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.max_instance_connections",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

/// Check severity threshold as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityThreshold {
    /// Only clean runs pass.
    Success,
    /// Warnings pass, errors block.
    Warn,
    /// Nothing blocks on severity.
    Error,
}

impl SeverityThreshold {
    /// Returns the check status this threshold admits at most.
    #[must_use]
    pub const fn status(self) -> TaskCheckStatus {
        match self {
            Self::Success => TaskCheckStatus::Success,
            Self::Warn => TaskCheckStatus::Warn,
            Self::Error => TaskCheckStatus::Error,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}
