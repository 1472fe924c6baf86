//! Testing utilities for sweepflow.
//!
//! This module provides:
//! - Scripted runners that stand in for real implementations
//! - Stage table fixtures and script writers
//! - Assertions for stage and run results

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_attempted, assert_full_chain, assert_stage_status};
#[cfg(unix)]
pub use fixtures::write_script;
pub use fixtures::{content_pipeline_table, stage_table};
pub use mocks::{PanickingRunner, RunnerCall, ScriptedRunner};
