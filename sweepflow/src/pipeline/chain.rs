//! The fixed four-stage chain.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{StageTable, SweepflowConfig};
use crate::core::{PipelineRun, RunStatus, StageId, StageResult};
use crate::events::{record_duration, record_status, StatusSink};
use crate::executor::RedundancyExecutor;
use crate::runner::ImplementationRunner;

/// Name under which whole runs are recorded in the status sink.
pub const PIPELINE_RUN_NAME: &str = "pipeline";

/// Runs fetch, scrape, summarize and tag in order.
///
/// Stages communicate through shared storage rather than in memory, so a
/// failed stage never stops the ones after it.
#[derive(Debug, Clone)]
pub struct PipelineChain {
    stages: StageTable,
    executor: RedundancyExecutor,
}

impl PipelineChain {
    /// Creates a chain over a stage table.
    #[must_use]
    pub fn new(stages: StageTable, executor: RedundancyExecutor) -> Self {
        Self { stages, executor }
    }

    /// Builds a chain, and its executor, from the orchestrator config.
    #[must_use]
    pub fn from_config(
        config: &SweepflowConfig,
        runner: Arc<dyn ImplementationRunner>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let executor = RedundancyExecutor::new(runner)
            .with_sink(sink)
            .with_config(config.executor.clone());
        Self::new(config.stages.clone(), executor)
    }

    /// The stage table.
    #[must_use]
    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    /// The executor used for every stage.
    #[must_use]
    pub fn executor(&self) -> &RedundancyExecutor {
        &self.executor
    }

    /// Runs every stage once, in chain order.
    pub async fn run(&self, force_all: bool) -> PipelineRun {
        let run_id = Uuid::now_v7();
        let span = info_span!("pipeline_run", run_id = %run_id, force_all);
        self.run_inner(run_id, force_all).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, force_all: bool) -> PipelineRun {
        let started_at = Utc::now();
        info!("Pipeline run started");

        let mut results = Vec::with_capacity(StageId::CHAIN.len());
        for stage in StageId::CHAIN {
            let result = self.run_stage(stage, force_all).await;
            if result.final_status.is_failure() {
                warn!(stage = %stage, "Stage failed, continuing with the next stage");
            }
            results.push(result);
        }

        let run = PipelineRun::new(run_id, force_all, results, started_at, Utc::now());
        let duration_ms = (run.finished_at - run.started_at).num_milliseconds();
        match run.overall_status {
            RunStatus::Failure => error!(duration_ms, "Pipeline run finished with failures"),
            RunStatus::Partial => warn!(duration_ms, "Pipeline run finished with issues"),
            RunStatus::Success => info!(duration_ms, new_items = run.total_new_items(), "Pipeline run finished"),
        }

        let sink = self.executor.sink().as_ref();
        record_status(
            sink,
            PIPELINE_RUN_NAME,
            &run.status_entries(),
            &run.overall_status.to_string(),
        )
        .await;
        record_duration(sink, PIPELINE_RUN_NAME, run.started_at, run.finished_at).await;
        run
    }

    /// Runs a single stage outside a full run.
    pub async fn run_stage(&self, stage: StageId, force_all: bool) -> StageResult {
        self.executor.execute(self.stages.get(stage), force_all).await
    }
}
