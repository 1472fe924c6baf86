//! # Sweepflow
//!
//! A redundant-execution orchestrator for multi-stage content pipelines.
//!
//! A pipeline run walks four stages in fixed order: fetch, scrape,
//! summarize and tag. Each stage has a primary implementation and ordered
//! fallbacks, all external scripts that can fail independently.
//!
//! - **Implementation runner**: launches one script in its own process
//!   group with soft and hard timeouts and classifies what it reported
//! - **Redundancy executor**: tries implementations in order and stops at
//!   the first that completes, or runs all of them on a full sweep
//! - **Pipeline chain**: runs every stage, even after a failed one
//! - **Single-flight queue**: at most one run executing, at most one pending
//! - **Trigger scheduler**: a periodic full sweep plus a frequent
//!   fetch-only check that requests a run when new items arrive
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sweepflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = load_config(Path::new("sweepflow.yaml"))?;
//! let runner = Arc::new(SubprocessRunner::from_config(&config)?);
//! let chain = PipelineChain::from_config(&config, runner, Arc::new(TracingStatusSink));
//!
//! let run = chain.run(false).await;
//! println!("{} ({} new items)", run.overall_status, run.total_new_items());
//! ```

#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod executor;
pub mod observability;
pub mod pipeline;
pub mod runner;
pub mod scheduler;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::ShutdownToken;
    pub use crate::config::{
        load_config, parse_config_str, ExecutorConfig, RunnerConfig, SchedulerConfig, StageConfig,
        StageTable, SweepflowConfig,
    };
    pub use crate::core::{
        Attempt, ExecutionOutcome, OutcomeStatus, PipelineRun, RunStatus, StageId, StageResult,
    };
    pub use crate::errors::{
        ConfigError, LaunchError, SchedulerStall, SinkError, SweepflowError,
    };
    pub use crate::events::{
        FanoutStatusSink, JsonLinesStatusSink, NoOpStatusSink, StatusSink, TracingStatusSink,
    };
    pub use crate::executor::{ExecutionMode, RedundancyExecutor};
    pub use crate::pipeline::PipelineChain;
    pub use crate::runner::{ImplementationRunner, ScriptResolver, SubprocessRunner};
    pub use crate::scheduler::{
        EnqueueOutcome, FetchCheckReport, QueueState, SingleFlightQueue, TriggerScheduler,
    };
}
