//! Mock runners for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::core::{ExecutionOutcome, StageId};
use crate::runner::ImplementationRunner;

/// One recorded runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCall {
    /// Stage the implementation belongs to.
    pub stage: StageId,
    /// Implementation id.
    pub implementation: String,
    /// Whether the run was forced.
    pub force_all: bool,
}

/// A runner that returns scripted outcomes per implementation and records
/// every call.
///
/// Implementations without a script return [`ExecutionOutcome::Failure`].
/// A queued sequence is consumed one outcome per call; the last outcome
/// repeats once the queue is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outcomes: Mutex<HashMap<String, VecDeque<ExecutionOutcome>>>,
    calls: Mutex<Vec<RunnerCall>>,
    delay: Option<Duration>,
}

impl ScriptedRunner {
    /// Creates a runner with no scripted outcomes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a fixed outcome for an implementation.
    #[must_use]
    pub fn with(self, implementation: impl Into<String>, outcome: ExecutionOutcome) -> Self {
        self.set(implementation, outcome);
        self
    }

    /// Scripts a sequence of outcomes for an implementation.
    #[must_use]
    pub fn with_sequence<I>(self, implementation: impl Into<String>, outcomes: I) -> Self
    where
        I: IntoIterator<Item = ExecutionOutcome>,
    {
        self.outcomes
            .lock()
            .insert(implementation.into(), outcomes.into_iter().collect());
        self
    }

    /// Makes every run take `delay` before returning.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the outcome for an implementation.
    pub fn set(&self, implementation: impl Into<String>, outcome: ExecutionOutcome) {
        self.outcomes
            .lock()
            .insert(implementation.into(), VecDeque::from([outcome]));
    }

    /// All calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().clone()
    }

    /// Implementation ids called so far, in order.
    #[must_use]
    pub fn called_implementations(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.implementation.clone()).collect()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Calls made for one stage.
    #[must_use]
    pub fn calls_for(&self, stage: StageId) -> Vec<RunnerCall> {
        self.calls.lock().iter().filter(|c| c.stage == stage).cloned().collect()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    fn next_outcome(&self, implementation: &str) -> ExecutionOutcome {
        let mut outcomes = self.outcomes.lock();
        match outcomes.get_mut(implementation) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(ExecutionOutcome::Failure),
            Some(queue) => queue.front().copied().unwrap_or(ExecutionOutcome::Failure),
            None => ExecutionOutcome::Failure,
        }
    }
}

#[async_trait]
impl ImplementationRunner for ScriptedRunner {
    async fn run(&self, stage: StageId, implementation: &str, force_all: bool) -> ExecutionOutcome {
        self.calls.lock().push(RunnerCall {
            stage,
            implementation: implementation.to_string(),
            force_all,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_outcome(implementation)
    }
}

/// A runner that panics for one implementation and delegates the rest.
#[derive(Debug)]
pub struct PanickingRunner {
    implementation: String,
    inner: ScriptedRunner,
}

impl PanickingRunner {
    /// Creates a runner that panics when `implementation` runs.
    #[must_use]
    pub fn new(implementation: impl Into<String>, inner: ScriptedRunner) -> Self {
        Self {
            implementation: implementation.into(),
            inner,
        }
    }

    /// The wrapped runner.
    #[must_use]
    pub fn inner(&self) -> &ScriptedRunner {
        &self.inner
    }
}

#[async_trait]
impl ImplementationRunner for PanickingRunner {
    async fn run(&self, stage: StageId, implementation: &str, force_all: bool) -> ExecutionOutcome {
        if implementation == self.implementation {
            panic!("implementation {implementation} crashed the runner");
        }
        self.inner.run(stage, implementation, force_all).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_runner_records_calls() {
        let runner = ScriptedRunner::new().with("a", ExecutionOutcome::Success);
        assert_eq!(runner.run(StageId::Tag, "a", true).await, ExecutionOutcome::Success);
        assert_eq!(runner.run(StageId::Tag, "b", false).await, ExecutionOutcome::Failure);
        assert_eq!(runner.called_implementations(), vec!["a", "b"]);
        assert!(runner.calls()[0].force_all);
        assert_eq!(runner.calls_for(StageId::Fetch).len(), 0);
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let runner = ScriptedRunner::new().with_sequence(
            "fetch",
            [ExecutionOutcome::NumericResult(3), ExecutionOutcome::NumericResult(0)],
        );
        assert_eq!(runner.run(StageId::Fetch, "fetch", false).await, ExecutionOutcome::NumericResult(3));
        assert_eq!(runner.run(StageId::Fetch, "fetch", false).await, ExecutionOutcome::NumericResult(0));
        assert_eq!(runner.run(StageId::Fetch, "fetch", false).await, ExecutionOutcome::NumericResult(0));
    }
}
