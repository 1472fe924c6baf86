//! Runtime settings for the runner, executor and scheduler.

use super::StageTable;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the implementation runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Seconds before the process group receives SIGTERM.
    #[serde(default = "default_soft_timeout")]
    pub soft_timeout_secs: f64,
    /// Seconds before the process group receives SIGKILL.
    #[serde(default = "default_hard_timeout")]
    pub hard_timeout_secs: f64,
    /// Maximum bytes of captured stdout/stderr forwarded to the log.
    #[serde(default = "default_max_log_bytes")]
    pub max_log_bytes: usize,
    /// Argument appended to the invocation during full sweeps.
    #[serde(default)]
    pub force_all_arg: Option<String>,
}

fn default_soft_timeout() -> f64 {
    300.0
}

fn default_hard_timeout() -> f64 {
    420.0
}

fn default_max_log_bytes() -> usize {
    8 * 1024
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            soft_timeout_secs: default_soft_timeout(),
            hard_timeout_secs: default_hard_timeout(),
            max_log_bytes: default_max_log_bytes(),
            force_all_arg: None,
        }
    }
}

impl RunnerConfig {
    /// Creates a runner configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets both timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, soft_secs: f64, hard_secs: f64) -> Self {
        self.soft_timeout_secs = soft_secs;
        self.hard_timeout_secs = hard_secs;
        self
    }

    /// Sets the argument passed during full sweeps.
    #[must_use]
    pub fn with_force_all_arg(mut self, arg: impl Into<String>) -> Self {
        self.force_all_arg = Some(arg.into());
        self
    }

    /// Soft timeout as a duration.
    pub fn soft_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("runner.soft_timeout_secs", self.soft_timeout_secs)
    }

    /// Hard timeout as a duration.
    pub fn hard_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("runner.hard_timeout_secs", self.hard_timeout_secs)
    }

    /// Checks the timeouts are positive and ordered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let soft = self.soft_timeout()?;
        let hard = self.hard_timeout()?;
        if soft > hard {
            return Err(ConfigError::InvalidDuration {
                field: "runner.soft_timeout_secs",
                reason: format!(
                    "soft timeout {}s exceeds hard timeout {}s",
                    self.soft_timeout_secs, self.hard_timeout_secs
                ),
            });
        }
        Ok(())
    }
}

/// Configuration for the redundancy executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Whether a partial success still falls back to the next implementation.
    #[serde(default)]
    pub fallback_on_partial: bool,
}

/// Configuration for the trigger scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between full-sweep triggers.
    #[serde(default = "default_full_sweep_interval")]
    pub full_sweep_interval_secs: f64,
    /// Seconds between fetch-only checks.
    #[serde(default = "default_fetch_check_interval")]
    pub fetch_check_interval_secs: f64,
    /// Enqueue a full sweep as soon as the scheduler starts.
    #[serde(default)]
    pub sweep_on_start: bool,
}

fn default_full_sweep_interval() -> f64 {
    30.0 * 60.0
}

fn default_fetch_check_interval() -> f64 {
    2.0 * 60.0
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            full_sweep_interval_secs: default_full_sweep_interval(),
            fetch_check_interval_secs: default_fetch_check_interval(),
            sweep_on_start: false,
        }
    }
}

impl SchedulerConfig {
    /// Full-sweep interval as a duration.
    pub fn full_sweep_interval(&self) -> Result<Duration, ConfigError> {
        seconds("scheduler.full_sweep_interval_secs", self.full_sweep_interval_secs)
    }

    /// Fetch-check interval as a duration.
    pub fn fetch_check_interval(&self) -> Result<Duration, ConfigError> {
        seconds("scheduler.fetch_check_interval_secs", self.fetch_check_interval_secs)
    }

    /// Checks both intervals are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.full_sweep_interval()?;
        self.fetch_check_interval()?;
        Ok(())
    }
}

/// Complete orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepflowConfig {
    /// Root directory holding `<stage dir>/<implementation>` scripts.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    /// Program used to launch scripts, e.g. `python3`.
    #[serde(default)]
    pub interpreter: Option<String>,
    /// Extension appended to implementation ids when resolving scripts.
    #[serde(default)]
    pub extension: Option<String>,
    /// Runner settings.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Executor settings.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Optional JSON-lines status log.
    #[serde(default)]
    pub status_log: Option<PathBuf>,
    /// Implementation lists per stage.
    pub stages: StageTable,
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("scripts")
}

impl SweepflowConfig {
    /// Creates a configuration with default settings for the given stages.
    #[must_use]
    pub fn new(stages: StageTable) -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            interpreter: None,
            extension: None,
            runner: RunnerConfig::default(),
            executor: ExecutorConfig::default(),
            scheduler: SchedulerConfig::default(),
            status_log: None,
            stages,
        }
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stages.validate()?;
        self.runner.validate()?;
        self.scheduler.validate()
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if value <= 0.0 {
        return Err(ConfigError::InvalidDuration {
            field,
            reason: format!("must be positive, got {value}"),
        });
    }
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::InvalidDuration {
        field,
        reason: e.to_string(),
    })
}
