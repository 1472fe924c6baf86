//! Core domain model types for sweepflow.
//!
//! This module contains the fundamental types used throughout the orchestrator:
//! - The closed set of pipeline stages
//! - Implementation outcomes and aggregated statuses
//! - Stage and pipeline run results

mod outcome;
mod result;
mod stage_id;

pub use outcome::{ExecutionOutcome, OutcomeStatus, RunStatus};
pub use result::{derive_final_status, Attempt, PipelineRun, StageResult};
pub use stage_id::{StageId, UnknownStage};
