//! Error types for the sweepflow orchestrator.
//!
//! Implementation failures never surface here: they are converted into
//! [`ExecutionOutcome::Failure`](crate::core::ExecutionOutcome) before they
//! reach the redundancy executor. These types cover configuration, process
//! launch, logging sinks and scheduler stalls.

use crate::core::StageId;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for sweepflow operations.
#[derive(Debug, Error)]
pub enum SweepflowError {
    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// An implementation could not be launched.
    #[error("{0}")]
    Launch(#[from] LaunchError),

    /// A status sink failed.
    #[error("{0}")]
    Sink(#[from] SinkError),

    /// The fetch-only check failed.
    #[error("{0}")]
    Stall(#[from] SchedulerStall),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A stage has no implementations.
    #[error("stage '{stage}' has an empty implementation list")]
    EmptyImplementations {
        /// The offending stage.
        stage: StageId,
    },

    /// A stage lists the same implementation twice.
    #[error("stage '{stage}' lists implementation '{implementation}' more than once")]
    DuplicateImplementation {
        /// The offending stage.
        stage: StageId,
        /// The repeated implementation id.
        implementation: String,
    },

    /// An implementation id is blank or escapes its stage directory.
    #[error("stage '{stage}' has invalid implementation id '{implementation}'")]
    InvalidImplementation {
        /// The offending stage.
        stage: StageId,
        /// The rejected id.
        implementation: String,
    },

    /// A stage is missing from the configuration.
    #[error("no configuration for stage '{0}'")]
    MissingStage(StageId),

    /// A stage is configured more than once, possibly under an alias.
    #[error("stage '{0}' is configured more than once")]
    DuplicateStage(StageId),

    /// A timing value is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidDuration {
        /// Name of the field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// One or more `${VAR}` references are not set.
    #[error("missing environment variable(s): {}", .0.join(", "))]
    MissingEnvVars(Vec<String>),

    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The YAML could not be parsed.
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Errors raised while starting an implementation process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The resolved executable does not exist.
    #[error("implementation '{implementation}' not found at {path}")]
    NotFound {
        /// Implementation id.
        implementation: String,
        /// Resolved path.
        path: PathBuf,
    },

    /// The operating system refused to spawn the process.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that was spawned.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed.
    #[error("failed to wait for '{program}': {source}")]
    Wait {
        /// Program that was waited on.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a status sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing a record failed.
    #[error("status sink write failed: {0}")]
    Write(#[from] std::io::Error),

    /// Encoding a record failed.
    #[error("status sink encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The sink's backend is unreachable.
    #[error("status sink unavailable: {0}")]
    Unavailable(String),
}

/// The fetch-only check could not produce a usable count.
#[derive(Debug, Clone, Error)]
#[error("fetch check stalled: {reason}")]
pub struct SchedulerStall {
    /// Why the check failed.
    pub reason: String,
}

impl SchedulerStall {
    /// Creates a new stall error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result alias for sweepflow operations.
pub type Result<T, E = SweepflowError> = std::result::Result<T, E>;
