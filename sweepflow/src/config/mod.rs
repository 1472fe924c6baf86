//! Orchestrator configuration.
//!
//! This module provides:
//! - Per-stage implementation lists with validation
//! - Runner, executor and scheduler settings
//! - YAML loading with `${VAR}` substitution

mod loader;
mod settings;
mod stages;

pub use loader::{load_config, parse_config_str, substitute_env_vars};
pub use settings::{ExecutorConfig, RunnerConfig, SchedulerConfig, SweepflowConfig};
pub use stages::{StageConfig, StageTable};
