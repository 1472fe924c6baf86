//! Ordered fallback over a stage's implementations.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{ExecutorConfig, StageConfig};
use crate::core::{Attempt, ExecutionOutcome, OutcomeStatus, StageId, StageResult};
use crate::events::{record_duration, record_status, NoOpStatusSink, StatusSink};
use crate::runner::ImplementationRunner;

/// How a stage walks its implementation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Stop at the first implementation that completes.
    Fallback,
    /// Run every implementation regardless of outcome.
    RunAll,
}

impl ExecutionMode {
    /// Mode for a run with the given force flag.
    #[must_use]
    pub const fn from_force(force_all: bool) -> Self {
        if force_all {
            Self::RunAll
        } else {
            Self::Fallback
        }
    }

    /// Whether this mode passes the force flag to implementations.
    #[must_use]
    pub const fn is_forced(self) -> bool {
        matches!(self, Self::RunAll)
    }
}

/// Runs one stage: primary first, then fallbacks, with early stop.
#[derive(Debug, Clone)]
pub struct RedundancyExecutor {
    runner: Arc<dyn ImplementationRunner>,
    sink: Arc<dyn StatusSink>,
    config: ExecutorConfig,
}

impl RedundancyExecutor {
    /// Creates an executor that records nothing.
    #[must_use]
    pub fn new(runner: Arc<dyn ImplementationRunner>) -> Self {
        Self {
            runner,
            sink: Arc::new(NoOpStatusSink),
            config: ExecutorConfig::default(),
        }
    }

    /// Sets the status sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets executor behavior.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// The status sink in use.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn StatusSink> {
        &self.sink
    }

    /// Runs a stage and records its status and duration.
    ///
    /// An invalid implementation list fails the stage without running
    /// anything.
    pub async fn execute(&self, config: &StageConfig, force_all: bool) -> StageResult {
        let stage = config.stage();
        let started_at = Utc::now();

        let result = match config.validate() {
            Ok(()) => {
                let attempts = self
                    .run_attempts(stage, config.implementations(), ExecutionMode::from_force(force_all))
                    .await;
                StageResult::from_attempts(stage, attempts, started_at, Utc::now())
            }
            Err(e) => {
                error!(stage = %stage, error = %e, "Stage configuration error, nothing to run");
                StageResult::configuration_error(stage, e.to_string(), started_at)
            }
        };

        log_stage_result(&result);
        record_status(
            self.sink.as_ref(),
            stage.as_str(),
            &result.status_entries(),
            &result.final_status.to_string(),
        )
        .await;
        record_duration(self.sink.as_ref(), stage.as_str(), result.started_at, result.finished_at).await;
        result
    }

    async fn run_attempts(
        &self,
        stage: StageId,
        implementations: &[String],
        mode: ExecutionMode,
    ) -> Vec<Attempt> {
        let mut attempts = Vec::with_capacity(implementations.len());

        for (index, implementation) in implementations.iter().enumerate() {
            if index > 0 {
                info!(stage = %stage, implementation = %implementation, "Trying next implementation");
            }

            let started_at = Utc::now();
            let outcome = self.run_one(stage, implementation, mode.is_forced()).await;
            attempts.push(Attempt::new(implementation.clone(), outcome, started_at, Utc::now()));

            if mode == ExecutionMode::Fallback && self.stops_fallback(outcome) {
                break;
            }
        }
        attempts
    }

    /// Runs one implementation; a runner panic counts as a failure.
    async fn run_one(&self, stage: StageId, implementation: &str, force_all: bool) -> ExecutionOutcome {
        let run = self.runner.run(stage, implementation, force_all);
        let outcome = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(stage = %stage, implementation, "Runner panicked, treating as failure");
                ExecutionOutcome::Failure
            }
        };

        match outcome {
            ExecutionOutcome::Success => info!(stage = %stage, implementation, "Implementation succeeded"),
            ExecutionOutcome::NumericResult(count) => {
                info!(stage = %stage, implementation, count, "Implementation succeeded with count");
            }
            ExecutionOutcome::PartialSuccess => {
                warn!(stage = %stage, implementation, "Implementation completed with issues");
            }
            ExecutionOutcome::Failure => error!(stage = %stage, implementation, "Implementation failed"),
        }
        outcome
    }

    const fn stops_fallback(&self, outcome: ExecutionOutcome) -> bool {
        match outcome {
            ExecutionOutcome::Success | ExecutionOutcome::NumericResult(_) => true,
            ExecutionOutcome::PartialSuccess => !self.config.fallback_on_partial,
            ExecutionOutcome::Failure => false,
        }
    }
}

fn log_stage_result(result: &StageResult) {
    let attempted = result.attempts.len();
    match result.final_status {
        OutcomeStatus::Success => {
            info!(stage = %result.stage, attempted, new_items = ?result.total_new_items, "Stage succeeded");
        }
        OutcomeStatus::PartialSuccess => {
            warn!(stage = %result.stage, attempted, "Stage completed with issues");
        }
        OutcomeStatus::Failure => {
            error!(stage = %result.stage, attempted, "All implementations failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingStatusSink, MockStatusSink};
    use crate::errors::SinkError;
    use crate::testing::{assert_attempted, assert_stage_status, PanickingRunner, ScriptedRunner};
    use pretty_assertions::assert_eq;
    use ExecutionOutcome::{Failure, NumericResult, PartialSuccess, Success};

    fn summarize() -> StageConfig {
        StageConfig::new(
            StageId::Summarize,
            "summarizer_groq_llama8b",
            ["summarizer_claude_haiku", "summarizer_gemini_flash"],
        )
    }

    fn executor(runner: &Arc<ScriptedRunner>) -> RedundancyExecutor {
        RedundancyExecutor::new(Arc::clone(runner) as Arc<dyn ImplementationRunner>)
    }

    #[tokio::test]
    async fn test_stops_after_primary_success() {
        let runner = Arc::new(ScriptedRunner::new().with("summarizer_groq_llama8b", Success));
        let result = executor(&runner).execute(&summarize(), false).await;

        assert_attempted(&result, &["summarizer_groq_llama8b"]);
        assert_stage_status(&result, OutcomeStatus::Success);
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_in_order() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("summarizer_groq_llama8b", Failure)
                .with("summarizer_claude_haiku", Success),
        );
        let result = executor(&runner).execute(&summarize(), false).await;

        assert_attempted(&result, &["summarizer_groq_llama8b", "summarizer_claude_haiku"]);
        assert_stage_status(&result, OutcomeStatus::Success);
    }

    #[tokio::test]
    async fn test_all_fail() {
        let runner = Arc::new(ScriptedRunner::new());
        let result = executor(&runner).execute(&summarize(), false).await;

        assert_eq!(result.attempts.len(), 3);
        assert_stage_status(&result, OutcomeStatus::Failure);
    }

    #[tokio::test]
    async fn test_partial_stops_fallback_by_default() {
        let runner = Arc::new(ScriptedRunner::new().with("summarizer_groq_llama8b", PartialSuccess));
        let result = executor(&runner).execute(&summarize(), false).await;

        assert_attempted(&result, &["summarizer_groq_llama8b"]);
        assert_stage_status(&result, OutcomeStatus::PartialSuccess);
    }

    #[tokio::test]
    async fn test_partial_falls_back_when_configured() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("summarizer_groq_llama8b", PartialSuccess)
                .with("summarizer_claude_haiku", Success),
        );
        let result = executor(&runner)
            .with_config(ExecutorConfig {
                fallback_on_partial: true,
            })
            .execute(&summarize(), false)
            .await;

        assert_attempted(&result, &["summarizer_groq_llama8b", "summarizer_claude_haiku"]);
        assert_stage_status(&result, OutcomeStatus::PartialSuccess);
    }

    #[tokio::test]
    async fn test_force_all_runs_everything_in_order() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("summarizer_groq_llama8b", Success)
                .with("summarizer_claude_haiku", Success)
                .with("summarizer_gemini_flash", Success),
        );
        let result = executor(&runner).execute(&summarize(), true).await;

        assert_attempted(
            &result,
            &["summarizer_groq_llama8b", "summarizer_claude_haiku", "summarizer_gemini_flash"],
        );
        assert!(runner.calls().iter().all(|c| c.force_all));
    }

    #[tokio::test]
    async fn test_force_all_later_success_recovers_failure() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("summarizer_groq_llama8b", Failure)
                .with("summarizer_claude_haiku", Success)
                .with("summarizer_gemini_flash", Success),
        );
        let result = executor(&runner).execute(&summarize(), true).await;
        assert_stage_status(&result, OutcomeStatus::Success);
    }

    #[tokio::test]
    async fn test_force_all_trailing_failure_fails_stage() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("summarizer_groq_llama8b", Success)
                .with("summarizer_claude_haiku", Success),
        );
        let result = executor(&runner).execute(&summarize(), true).await;
        assert_eq!(result.attempts.len(), 3);
        assert_stage_status(&result, OutcomeStatus::Failure);
    }

    #[tokio::test]
    async fn test_empty_list_is_configuration_error() {
        let runner = Arc::new(ScriptedRunner::new());
        let config = StageConfig::from_list(StageId::Tag, Vec::<String>::new());
        let result = executor(&runner).execute(&config, false).await;

        assert_stage_status(&result, OutcomeStatus::Failure);
        assert!(result.configuration_error.is_some());
        assert!(result.attempts.is_empty());
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_count_sums_attempts() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("rss", NumericResult(4))
                .with("sitemap", NumericResult(3)),
        );
        let config = StageConfig::new(StageId::Fetch, "rss", ["sitemap"]);

        let result = executor(&runner).execute(&config, false).await;
        assert_eq!(result.total_new_items, Some(4));

        let result = executor(&runner).execute(&config, true).await;
        assert_eq!(result.total_new_items, Some(7));
    }

    #[tokio::test]
    async fn test_huge_fetch_counts_do_not_overflow() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("rss", NumericResult(u64::MAX))
                .with("sitemap", NumericResult(1)),
        );
        let config = StageConfig::new(StageId::Fetch, "rss", ["sitemap"]);

        let result = executor(&runner).execute(&config, true).await;
        assert_stage_status(&result, OutcomeStatus::Success);
        assert_eq!(result.total_new_items, Some(u64::MAX));
    }

    #[tokio::test]
    async fn test_runner_panic_is_failure() {
        let inner = ScriptedRunner::new().with("summarizer_claude_haiku", Success);
        let runner = Arc::new(PanickingRunner::new("summarizer_groq_llama8b", inner));
        let executor = RedundancyExecutor::new(Arc::clone(&runner) as Arc<dyn ImplementationRunner>);

        let result = executor.execute(&summarize(), false).await;
        assert_eq!(result.attempts[0].outcome, Failure);
        assert_stage_status(&result, OutcomeStatus::Success);
        assert_eq!(runner.inner().called_implementations(), vec!["summarizer_claude_haiku"]);
    }

    #[tokio::test]
    async fn test_records_status_and_duration() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("summarizer_groq_llama8b", Failure)
                .with("summarizer_claude_haiku", Success),
        );
        let sink = Arc::new(CollectingStatusSink::new());
        let result = executor(&runner)
            .with_sink(Arc::clone(&sink) as Arc<dyn StatusSink>)
            .execute(&summarize(), false)
            .await;

        let statuses = sink.statuses_for("summarize");
        assert_eq!(statuses.len(), 1);
        assert_eq!(
            statuses[0].entries,
            vec![
                "summarizer_groq_llama8b: failure".to_string(),
                "summarizer_claude_haiku: success".to_string(),
            ]
        );
        assert_eq!(statuses[0].status, result.final_status.to_string());
        assert_eq!(sink.durations().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_stage() {
        let runner = Arc::new(ScriptedRunner::new().with("summarizer_groq_llama8b", Success));
        let mut sink = MockStatusSink::new();
        sink.expect_log_status()
            .times(1)
            .returning(|_, _, _| Err(SinkError::Unavailable("disk full".to_string())));
        sink.expect_log_duration()
            .times(1)
            .returning(|_, _, _| Err(SinkError::Unavailable("disk full".to_string())));

        let result = executor(&runner)
            .with_sink(Arc::new(sink))
            .execute(&summarize(), false)
            .await;
        assert_stage_status(&result, OutcomeStatus::Success);
    }
}
