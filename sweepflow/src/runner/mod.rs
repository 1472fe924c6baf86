//! Running a single implementation.
//!
//! An implementation is an external script for one stage. The runner
//! resolves it, launches it in its own process group, enforces the soft and
//! hard timeouts, and classifies what it reported.

mod group;
mod process;
mod resolve;

#[cfg(all(test, unix))]
mod process_tests;

pub use group::{signal_group, GroupSignal};
pub use process::{classify, parse_count, ProcessExit, SubprocessRunner, PARTIAL_EXIT_CODE};
pub use resolve::{Invocation, ScriptResolver};

use crate::core::{ExecutionOutcome, StageId};
use async_trait::async_trait;

/// Runs one implementation of a stage and classifies the result.
///
/// Runners never fail: launch errors, timeouts and crashes all come back
/// as [`ExecutionOutcome::Failure`].
#[async_trait]
pub trait ImplementationRunner: Send + Sync + std::fmt::Debug {
    /// Runs `implementation` for `stage`.
    async fn run(&self, stage: StageId, implementation: &str, force_all: bool) -> ExecutionOutcome;
}
