//! Single-flight run queue.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::cancellation::ShutdownToken;
use crate::core::PipelineRun;
use crate::pipeline::PipelineChain;

/// A requested pipeline run waiting for the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Whether every implementation of every stage should run.
    pub force_all: bool,
    /// When the first coalesced request arrived.
    pub requested_at: DateTime<Utc>,
}

/// Observable state of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Nothing pending or running.
    Idle,
    /// One entry waiting, whether or not a run is in progress.
    Pending,
    /// A run is in progress and nothing is waiting.
    Running,
}

/// What happened to an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    /// A new pending entry was created.
    Queued,
    /// The request merged into the existing pending entry.
    Coalesced,
}

/// Queue counters since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    /// Enqueue requests received.
    pub requests_received: u64,
    /// Requests merged into an existing pending entry.
    pub requests_coalesced: u64,
    /// Runs started by the worker.
    pub runs_started: u64,
    /// Runs that finished.
    pub runs_completed: u64,
}

/// All mutable queue state. Only ever touched under one lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerState {
    /// The single waiting entry, if any.
    pub pending: Option<QueueEntry>,
    /// Whether a run is executing.
    pub run_in_progress: bool,
    /// When the most recent run finished.
    pub last_run_finished_at: Option<DateTime<Utc>>,
    /// Counters since start.
    pub counters: QueueCounters,
}

impl SchedulerState {
    /// Derived queue state.
    #[must_use]
    pub const fn state(&self) -> QueueState {
        if self.pending.is_some() {
            QueueState::Pending
        } else if self.run_in_progress {
            QueueState::Running
        } else {
            QueueState::Idle
        }
    }
}

/// Serializes pipeline runs: at most one running, at most one pending.
#[derive(Debug, Default)]
pub struct SingleFlightQueue {
    state: Mutex<SchedulerState>,
    wake: Notify,
}

impl SingleFlightQueue {
    /// Creates an idle queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a run.
    ///
    /// If an entry is already pending the request is merged into it and the
    /// pending entry keeps the stronger force flag.
    pub fn enqueue(&self, force_all: bool) -> EnqueueOutcome {
        let mut state = self.state.lock();
        state.counters.requests_received += 1;

        if let Some(pending) = state.pending.as_mut() {
            pending.force_all |= force_all;
            let merged_force = pending.force_all;
            state.counters.requests_coalesced += 1;
            debug!(force_all, merged_force, "Run request coalesced into pending entry");
            return EnqueueOutcome::Coalesced;
        }

        state.pending = Some(QueueEntry {
            force_all,
            requested_at: Utc::now(),
        });
        let running = state.run_in_progress;
        drop(state);

        info!(force_all, behind_running = running, "Run queued");
        self.wake.notify_one();
        EnqueueOutcome::Queued
    }

    /// Takes the pending entry and marks a run in progress.
    ///
    /// Returns `None` if nothing is pending or a run is already in progress.
    pub fn try_begin(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock();
        if state.run_in_progress {
            return None;
        }
        let entry = state.pending.take()?;
        state.run_in_progress = true;
        state.counters.runs_started += 1;
        Some(entry)
    }

    /// Marks the current run finished.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        if !state.run_in_progress {
            warn!("finish called with no run in progress");
            return;
        }
        state.run_in_progress = false;
        state.last_run_finished_at = Some(Utc::now());
        state.counters.runs_completed += 1;
        let has_pending = state.pending.is_some();
        drop(state);

        if has_pending {
            self.wake.notify_one();
        }
    }

    /// Drops the pending entry, returning it.
    pub fn discard_pending(&self) -> Option<QueueEntry> {
        self.state.lock().pending.take()
    }

    /// A copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerState {
        self.state.lock().clone()
    }

    /// Derived queue state.
    #[must_use]
    pub fn state(&self) -> QueueState {
        self.state.lock().state()
    }

    /// Begins the pending run, if any, and runs it to completion.
    pub async fn run_next(&self, chain: &PipelineChain) -> Option<PipelineRun> {
        let entry = self.try_begin()?;
        let _guard = RunGuard { queue: self };
        debug!(
            force_all = entry.force_all,
            waited_ms = (Utc::now() - entry.requested_at).num_milliseconds(),
            "Starting queued run"
        );
        Some(chain.run(entry.force_all).await)
    }

    /// Drains the queue until shutdown, one run at a time.
    ///
    /// An in-flight run always completes. Entries still pending at shutdown
    /// are dropped. Returns the number of runs executed.
    pub async fn run_worker(&self, chain: &PipelineChain, shutdown: &ShutdownToken) -> u64 {
        let mut runs = 0;
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            if self.run_next(chain).await.is_some() {
                runs += 1;
                continue;
            }
            tokio::select! {
                () = self.wake.notified() => {}
                () = shutdown.cancelled() => break,
            }
        }

        if let Some(entry) = self.discard_pending() {
            info!(force_all = entry.force_all, "Dropping pending run at shutdown");
        }
        info!(runs, "Queue worker stopped");
        runs
    }
}

/// Releases the running flag even if the run future is dropped mid-way.
struct RunGuard<'a> {
    queue: &'a SingleFlightQueue,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.queue.finish();
    }
}
