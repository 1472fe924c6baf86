//! Stage and pipeline run results.

use super::{ExecutionOutcome, OutcomeStatus, RunStatus, StageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One implementation invocation within a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// Implementation identifier.
    pub implementation: String,
    /// Classified outcome.
    pub outcome: ExecutionOutcome,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// When the invocation returned.
    pub finished_at: DateTime<Utc>,
}

impl Attempt {
    /// Creates an attempt record.
    #[must_use]
    pub fn new(
        implementation: impl Into<String>,
        outcome: ExecutionOutcome,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            implementation: implementation.into(),
            outcome,
            started_at,
            finished_at,
        }
    }

    /// Wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Aggregated result of running one stage's implementations.
///
/// Immutable once built; handed to the status sink and then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage that ran.
    pub stage: StageId,
    /// Attempts in execution order.
    pub attempts: Vec<Attempt>,
    /// Derived stage status.
    pub final_status: OutcomeStatus,
    /// Sum of reported counts, saturating (fetch stage only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_new_items: Option<u64>,
    /// Configuration problem that prevented any attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_error: Option<String>,
    /// Stage start time.
    pub started_at: DateTime<Utc>,
    /// Stage end time.
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    /// Builds a result from the attempts made, deriving the final status.
    #[must_use]
    pub fn from_attempts(
        stage: StageId,
        attempts: Vec<Attempt>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let final_status = derive_final_status(&attempts);
        let total_new_items = stage.reports_new_items().then(|| {
            attempts
                .iter()
                .filter_map(|a| a.outcome.count())
                .fold(0u64, u64::saturating_add)
        });

        Self {
            stage,
            attempts,
            final_status,
            total_new_items,
            configuration_error: None,
            started_at,
            finished_at,
        }
    }

    /// Builds a failed result for a stage whose configuration is unusable.
    #[must_use]
    pub fn configuration_error(stage: StageId, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            stage,
            attempts: Vec::new(),
            final_status: OutcomeStatus::Failure,
            total_new_items: stage.reports_new_items().then_some(0),
            configuration_error: Some(message.into()),
            started_at: at,
            finished_at: at,
        }
    }

    /// Implementation ids in the order they ran.
    #[must_use]
    pub fn attempted_implementations(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.implementation.as_str()).collect()
    }

    /// New item count, zero for stages that do not report one.
    #[must_use]
    pub fn new_items(&self) -> u64 {
        self.total_new_items.unwrap_or(0)
    }

    /// One line per attempt, for the status sink.
    #[must_use]
    pub fn status_entries(&self) -> Vec<String> {
        if let Some(err) = &self.configuration_error {
            return vec![format!("configuration error: {err}")];
        }
        self.attempts
            .iter()
            .map(|a| format!("{}: {}", a.implementation, a.outcome))
            .collect()
    }
}

/// Derives a stage status from its attempts.
///
/// A failure is recovered when a later attempt in the same stage completes
/// (success, count or partial). The stage fails only if an unrecovered
/// failure remains, or if nothing ran at all.
#[must_use]
pub fn derive_final_status(attempts: &[Attempt]) -> OutcomeStatus {
    if attempts.is_empty() {
        return OutcomeStatus::Failure;
    }

    let mut unrecovered_failure = false;
    let mut partial = false;
    for attempt in attempts {
        match attempt.outcome {
            ExecutionOutcome::Failure => unrecovered_failure = true,
            ExecutionOutcome::PartialSuccess => {
                partial = true;
                unrecovered_failure = false;
            }
            ExecutionOutcome::Success | ExecutionOutcome::NumericResult(_) => {
                unrecovered_failure = false;
            }
        }
    }

    if unrecovered_failure {
        OutcomeStatus::Failure
    } else if partial {
        OutcomeStatus::PartialSuccess
    } else {
        OutcomeStatus::Success
    }
}

/// One traversal of the pipeline chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Whether every implementation of every stage was forced to run.
    pub force_all: bool,
    /// Stage results in chain order.
    pub stages: Vec<StageResult>,
    /// Derived aggregate status.
    pub overall_status: RunStatus,
    /// Run start time.
    pub started_at: DateTime<Utc>,
    /// Run end time.
    pub finished_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Builds a run record, deriving the overall status.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        force_all: bool,
        stages: Vec<StageResult>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let overall_status = RunStatus::from_stages(stages.iter().map(|s| s.final_status));
        Self {
            run_id,
            force_all,
            stages,
            overall_status,
            started_at,
            finished_at,
        }
    }

    /// Returns the result for a stage, if it ran.
    #[must_use]
    pub fn stage(&self, stage: StageId) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// New items reported by the fetch stage of this run.
    #[must_use]
    pub fn total_new_items(&self) -> u64 {
        self.stage(StageId::Fetch).map_or(0, StageResult::new_items)
    }

    /// One line per stage, for the status sink.
    #[must_use]
    pub fn status_entries(&self) -> Vec<String> {
        self.stages
            .iter()
            .map(|s| format!("{}: {}", s.stage, s.final_status))
            .collect()
    }
}
