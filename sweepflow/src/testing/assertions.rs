//! Assertion helpers for stage and run results.

use crate::core::{OutcomeStatus, PipelineRun, StageId, StageResult};

/// Asserts the implementations a stage attempted, in order.
///
/// # Panics
///
/// Panics if the attempted implementations differ.
pub fn assert_attempted(result: &StageResult, expected: &[&str]) {
    assert_eq!(
        result.attempted_implementations(),
        expected,
        "unexpected attempts for stage {}",
        result.stage
    );
}

/// Asserts a stage's final status.
///
/// # Panics
///
/// Panics if the status differs.
pub fn assert_stage_status(result: &StageResult, expected: OutcomeStatus) {
    assert_eq!(
        result.final_status, expected,
        "unexpected final status for stage {}",
        result.stage
    );
}

/// Asserts that a run visited all four stages in chain order.
///
/// # Panics
///
/// Panics if any stage is missing or out of order.
pub fn assert_full_chain(run: &PipelineRun) {
    let stages: Vec<StageId> = run.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, StageId::CHAIN.to_vec(), "run did not visit every stage");
}
