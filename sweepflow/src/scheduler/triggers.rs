//! Periodic triggers and administrative entry points.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::queue::{EnqueueOutcome, SingleFlightQueue};
use crate::cancellation::ShutdownToken;
use crate::config::SchedulerConfig;
use crate::core::{OutcomeStatus, StageId, StageResult};
use crate::errors::{ConfigError, SchedulerStall};
use crate::events::record_status;
use crate::observability::SpanTimer;
use crate::pipeline::PipelineChain;

/// Name under which fetch checks are recorded in the status sink.
pub const FETCH_CHECK_NAME: &str = "fetch_urls";

/// Result of one fetch-only check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCheckReport {
    /// Items the fetch stage reported as new.
    pub total_new_items: u64,
    /// Final status of the fetch stage.
    pub status: OutcomeStatus,
    /// Whether a run was requested, and how the queue took it.
    pub enqueued: Option<EnqueueOutcome>,
}

/// Decides when pipeline runs are enqueued.
///
/// Two periodic sources feed the queue: a full sweep that forces every
/// implementation to run, and a cheap fetch-only check that requests a
/// normal run when new items arrived.
#[derive(Debug, Clone)]
pub struct TriggerScheduler {
    chain: Arc<PipelineChain>,
    queue: Arc<SingleFlightQueue>,
    full_sweep_interval: Duration,
    fetch_check_interval: Duration,
    sweep_on_start: bool,
}

impl TriggerScheduler {
    /// Creates a scheduler feeding `queue` with runs of `chain`.
    ///
    /// # Errors
    ///
    /// Returns an error if an interval is not positive.
    pub fn new(
        chain: Arc<PipelineChain>,
        queue: Arc<SingleFlightQueue>,
        config: &SchedulerConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            chain,
            queue,
            full_sweep_interval: config.full_sweep_interval()?,
            fetch_check_interval: config.fetch_check_interval()?,
            sweep_on_start: config.sweep_on_start,
        })
    }

    /// The queue runs are sent to.
    #[must_use]
    pub fn queue(&self) -> &Arc<SingleFlightQueue> {
        &self.queue
    }

    /// The chain the worker runs.
    #[must_use]
    pub fn chain(&self) -> &Arc<PipelineChain> {
        &self.chain
    }

    /// Runs the fetch stage alone and requests a normal run if it found
    /// new items.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerStall`] if the fetch stage failed; nothing is
    /// enqueued in that case.
    pub async fn fetch_check(&self) -> Result<FetchCheckReport, SchedulerStall> {
        let timer = SpanTimer::start("fetch_check");
        let result = self.chain.run_stage(StageId::Fetch, false).await;
        let total_new_items = result.new_items();
        let failed = result.final_status.is_failure();
        let entry = if failed {
            "Error".to_string()
        } else {
            format!("Total new URLs added: {total_new_items}")
        };

        record_status(
            self.chain.executor().sink().as_ref(),
            FETCH_CHECK_NAME,
            &[entry],
            &result.final_status.to_string(),
        )
        .await;

        if failed {
            return Err(stall_from(&result));
        }

        let enqueued = (total_new_items > 0).then(|| self.queue.enqueue(false));
        info!(
            total_new_items,
            enqueued = enqueued.is_some(),
            duration_ms = timer.finish(),
            "Fetch check finished"
        );
        Ok(FetchCheckReport {
            total_new_items,
            status: result.final_status,
            enqueued,
        })
    }

    /// Requests a full sweep.
    pub fn full_sweep_tick(&self) -> EnqueueOutcome {
        info!("Full sweep triggered");
        self.queue.enqueue(true)
    }

    /// Runs one stage immediately, outside the queue.
    pub async fn run_stage_now(&self, stage: StageId, force_all: bool) -> StageResult {
        info!(stage = %stage, force_all, "Manual stage run");
        self.chain.run_stage(stage, force_all).await
    }

    /// Requests a full chain run through the queue.
    pub fn run_chain_now(&self, force_all: bool) -> EnqueueOutcome {
        info!(force_all, "Manual chain run requested");
        self.queue.enqueue(force_all)
    }

    /// Runs the triggers and the queue worker until shutdown.
    pub async fn run(&self, shutdown: &ShutdownToken) {
        info!(
            full_sweep_secs = self.full_sweep_interval.as_secs_f64(),
            fetch_check_secs = self.fetch_check_interval.as_secs_f64(),
            "Scheduler started"
        );
        let worker = self.queue.run_worker(&self.chain, shutdown);
        let triggers = self.run_triggers(shutdown);
        tokio::join!(worker, triggers);
        info!("Scheduler stopped");
    }

    async fn run_triggers(&self, shutdown: &ShutdownToken) {
        if self.sweep_on_start {
            self.full_sweep_tick();
        }

        let now = Instant::now();
        let mut sweep = interval_at(now + self.full_sweep_interval, self.full_sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut check = interval_at(now + self.fetch_check_interval, self.fetch_check_interval);
        check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = sweep.tick() => {
                    self.full_sweep_tick();
                }
                _ = check.tick() => {
                    self.fetch_tick().await;
                }
            }
        }
    }

    /// One fetch-check tick. A stall is logged and the next tick proceeds.
    async fn fetch_tick(&self) {
        if self.queue.snapshot().run_in_progress {
            debug!("Run in progress, skipping fetch check");
            return;
        }
        if let Err(stall) = self.fetch_check().await {
            warn!(error = %stall, "Fetch check failed, waiting for next tick");
        }
    }
}

fn stall_from(result: &StageResult) -> SchedulerStall {
    match &result.configuration_error {
        Some(err) => SchedulerStall::new(format!("fetch stage misconfigured: {err}")),
        None => SchedulerStall::new(format!(
            "all {} fetch implementations failed",
            result.attempts.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionOutcome::{Failure, NumericResult, Success};
    use crate::events::{CollectingStatusSink, StatusSink};
    use crate::executor::RedundancyExecutor;
    use crate::runner::ImplementationRunner;
    use crate::scheduler::QueueState;
    use crate::testing::{content_pipeline_table, ScriptedRunner};
    use pretty_assertions::assert_eq;

    fn scheduler(
        runner: &Arc<ScriptedRunner>,
        config: &SchedulerConfig,
    ) -> (Arc<TriggerScheduler>, Arc<CollectingStatusSink>) {
        let sink = Arc::new(CollectingStatusSink::new());
        let executor = RedundancyExecutor::new(Arc::clone(runner) as Arc<dyn ImplementationRunner>)
            .with_sink(Arc::clone(&sink) as Arc<dyn StatusSink>);
        let chain = Arc::new(PipelineChain::new(content_pipeline_table(), executor));
        let scheduler = TriggerScheduler::new(chain, Arc::new(SingleFlightQueue::new()), config).unwrap();
        (Arc::new(scheduler), sink)
    }

    fn spawn_run(
        scheduler: &Arc<TriggerScheduler>,
        shutdown: &Arc<ShutdownToken>,
    ) -> tokio::task::JoinHandle<()> {
        let (scheduler, shutdown) = (Arc::clone(scheduler), Arc::clone(shutdown));
        tokio::spawn(async move { scheduler.run(&shutdown).await })
    }

    #[tokio::test]
    async fn test_fetch_check_enqueues_on_new_items() {
        let runner = Arc::new(ScriptedRunner::new().with("fetch_urls_feedparser", NumericResult(3)));
        let (scheduler, sink) = scheduler(&runner, &SchedulerConfig::default());

        let report = scheduler.fetch_check().await.unwrap();
        assert_eq!(report.total_new_items, 3);
        assert_eq!(report.enqueued, Some(EnqueueOutcome::Queued));

        let pending = scheduler.queue().snapshot().pending.unwrap();
        assert!(!pending.force_all);
        assert_eq!(
            sink.statuses_for(FETCH_CHECK_NAME)[0].entries,
            vec!["Total new URLs added: 3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fetch_check_is_idempotent_without_new_items() {
        let runner = Arc::new(ScriptedRunner::new().with("fetch_urls_feedparser", NumericResult(0)));
        let (scheduler, _) = scheduler(&runner, &SchedulerConfig::default());

        for _ in 0..2 {
            let report = scheduler.fetch_check().await.unwrap();
            assert_eq!(report.total_new_items, 0);
            assert_eq!(report.enqueued, None);
        }
        assert_eq!(scheduler.queue().state(), QueueState::Idle);
        assert_eq!(scheduler.queue().snapshot().counters.requests_received, 0);
    }

    #[tokio::test]
    async fn test_fetch_check_success_without_count_does_not_enqueue() {
        let runner = Arc::new(ScriptedRunner::new().with("fetch_urls_feedparser", Success));
        let (scheduler, _) = scheduler(&runner, &SchedulerConfig::default());

        let report = scheduler.fetch_check().await.unwrap();
        assert_eq!(report.total_new_items, 0);
        assert_eq!(report.enqueued, None);
    }

    #[tokio::test]
    async fn test_failed_fetch_check_is_a_stall() {
        let runner = Arc::new(ScriptedRunner::new().with("fetch_urls_feedparser", Failure));
        let (scheduler, sink) = scheduler(&runner, &SchedulerConfig::default());

        let stall = scheduler.fetch_check().await.unwrap_err();
        assert!(stall.reason.contains("fetch implementations failed"));
        assert_eq!(scheduler.queue().state(), QueueState::Idle);
        let record = &sink.statuses_for(FETCH_CHECK_NAME)[0];
        assert_eq!(record.status, "failure");
        assert_eq!(record.entries, vec!["Error".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_negative_fetch_count_stalls() {
        use crate::config::RunnerConfig;
        use crate::runner::{ScriptResolver, SubprocessRunner};
        use crate::testing::write_script;

        let dir = tempfile::tempdir().unwrap();
        let _ = write_script(dir.path(), StageId::Fetch, "fetch_urls_feedparser", "echo -3");
        let runner = SubprocessRunner::new(ScriptResolver::new(dir.path()), &RunnerConfig::default()).unwrap();
        let sink = Arc::new(CollectingStatusSink::new());
        let executor = RedundancyExecutor::new(Arc::new(runner) as Arc<dyn ImplementationRunner>)
            .with_sink(Arc::clone(&sink) as Arc<dyn StatusSink>);
        let chain = Arc::new(PipelineChain::new(content_pipeline_table(), executor));
        let scheduler =
            TriggerScheduler::new(chain, Arc::new(SingleFlightQueue::new()), &SchedulerConfig::default()).unwrap();

        assert!(scheduler.fetch_check().await.is_err());
        assert_eq!(scheduler.queue().state(), QueueState::Idle);
        let record = &sink.statuses_for(FETCH_CHECK_NAME)[0];
        assert_eq!(record.status, "failure");
        assert_eq!(record.entries, vec!["Error".to_string()]);
    }

    #[test]
    fn test_full_sweep_upgrades_pending_run() {
        let runner = Arc::new(ScriptedRunner::new());
        let (scheduler, _) = scheduler(&runner, &SchedulerConfig::default());

        assert_eq!(scheduler.run_chain_now(false), EnqueueOutcome::Queued);
        assert_eq!(scheduler.full_sweep_tick(), EnqueueOutcome::Coalesced);
        assert!(scheduler.queue().snapshot().pending.unwrap().force_all);
    }

    #[tokio::test]
    async fn test_run_stage_now_bypasses_queue() {
        let runner = Arc::new(ScriptedRunner::new().with("tagging_groq_llama8b", Success));
        let (scheduler, _) = scheduler(&runner, &SchedulerConfig::default());

        let result = scheduler.run_stage_now(StageId::Tag, false).await;
        assert_eq!(result.final_status, OutcomeStatus::Success);
        assert_eq!(scheduler.queue().snapshot().counters.runs_started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fires_both_triggers() {
        let runner = Arc::new(ScriptedRunner::new().with("fetch_urls_feedparser", NumericResult(0)));
        let (scheduler, _) = scheduler(&runner, &SchedulerConfig::default());
        let shutdown = Arc::new(ShutdownToken::new());
        let handle = spawn_run(&scheduler, &shutdown);

        tokio::time::sleep(Duration::from_secs(2 * 60 + 1)).await;
        assert_eq!(runner.calls_for(StageId::Fetch).len(), 1);
        assert_eq!(scheduler.queue().state(), QueueState::Idle);

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        shutdown.cancel("test");
        handle.await.unwrap();

        // One full sweep: every implementation of every stage, forced.
        let forced = runner.calls().iter().filter(|c| c.force_all).count();
        assert_eq!(forced, 7);
        assert_eq!(scheduler.queue().snapshot().counters.runs_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_items_trigger_normal_run() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with_sequence("fetch_urls_feedparser", [NumericResult(5), NumericResult(0)])
                .with("scrape_puppeteer", Success)
                .with("summarizer_groq_llama8b", Success)
                .with("tagging_groq_llama8b", Success),
        );
        let (scheduler, _) = scheduler(&runner, &SchedulerConfig::default());
        let shutdown = Arc::new(ShutdownToken::new());
        let handle = spawn_run(&scheduler, &shutdown);

        tokio::time::sleep(Duration::from_secs(3 * 60)).await;
        shutdown.cancel("test");
        handle.await.unwrap();

        assert_eq!(scheduler.queue().snapshot().counters.runs_completed, 1);
        assert!(runner.calls().iter().all(|c| !c.force_all));
        assert_eq!(runner.calls_for(StageId::Tag).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_checks_keep_scheduler_alive() {
        let runner = Arc::new(ScriptedRunner::new().with("fetch_urls_feedparser", Failure));
        let (scheduler, _) = scheduler(&runner, &SchedulerConfig::default());
        let shutdown = Arc::new(ShutdownToken::new());
        let handle = spawn_run(&scheduler, &shutdown);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert!(!handle.is_finished());
        shutdown.cancel("test");
        handle.await.unwrap();

        assert_eq!(runner.calls_for(StageId::Fetch).len(), 2);
        assert_eq!(scheduler.queue().snapshot().counters.requests_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_on_start() {
        let runner = Arc::new(ScriptedRunner::new());
        let config = SchedulerConfig {
            sweep_on_start: true,
            ..SchedulerConfig::default()
        };
        let (scheduler, _) = scheduler(&runner, &config);
        let shutdown = Arc::new(ShutdownToken::new());
        let handle = spawn_run(&scheduler, &shutdown);

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.cancel("test");
        handle.await.unwrap();

        assert_eq!(scheduler.queue().snapshot().counters.runs_completed, 1);
        assert!(runner.calls().iter().all(|c| c.force_all));
    }
}
