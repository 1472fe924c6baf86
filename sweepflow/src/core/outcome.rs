//! Implementation outcomes and aggregated statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The result of running one implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Implementation completed cleanly (exit code 0).
    Success,
    /// Implementation completed with recoverable issues (exit code 2).
    PartialSuccess,
    /// Non-zero exit, launch failure, panic or timeout.
    Failure,
    /// Implementation printed a single non-negative integer on stdout.
    NumericResult(u64),
}

impl ExecutionOutcome {
    /// Returns true if this outcome satisfies the stage and stops fallback.
    #[must_use]
    pub const fn is_success_like(&self) -> bool {
        matches!(self, Self::Success | Self::NumericResult(_))
    }

    /// Returns true if the implementation failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }

    /// Returns the reported item count, if any.
    #[must_use]
    pub const fn count(&self) -> Option<u64> {
        match self {
            Self::NumericResult(n) => Some(*n),
            _ => None,
        }
    }

    /// Collapses the outcome into a status.
    #[must_use]
    pub const fn status(&self) -> OutcomeStatus {
        match self {
            Self::Success | Self::NumericResult(_) => OutcomeStatus::Success,
            Self::PartialSuccess => OutcomeStatus::PartialSuccess,
            Self::Failure => OutcomeStatus::Failure,
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial"),
            Self::Failure => write!(f, "failure"),
            Self::NumericResult(n) => write!(f, "count({n})"),
        }
    }
}

/// Uniform status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Stage completed.
    Success,
    /// Stage completed but some implementation reported recoverable issues.
    PartialSuccess,
    /// Stage has at least one unrecovered failure.
    Failure,
}

impl OutcomeStatus {
    /// Returns true for `Failure`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Aggregate status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage succeeded.
    Success,
    /// No stage failed, at least one was partial.
    Partial,
    /// At least one stage failed.
    Failure,
}

impl RunStatus {
    /// Derives the run status from stage statuses.
    pub fn from_stages<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = OutcomeStatus>,
    {
        let mut partial = false;
        for status in statuses {
            match status {
                OutcomeStatus::Failure => return Self::Failure,
                OutcomeStatus::PartialSuccess => partial = true,
                OutcomeStatus::Success => {}
            }
        }
        if partial {
            Self::Partial
        } else {
            Self::Success
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_result_is_success_like() {
        assert!(ExecutionOutcome::NumericResult(0).is_success_like());
        assert!(ExecutionOutcome::Success.is_success_like());
        assert!(!ExecutionOutcome::PartialSuccess.is_success_like());
        assert!(!ExecutionOutcome::Failure.is_success_like());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ExecutionOutcome::NumericResult(7).to_string(), "count(7)");
        assert_eq!(ExecutionOutcome::PartialSuccess.to_string(), "partial");
        assert_eq!(OutcomeStatus::Failure.to_string(), "failure");
    }

    #[test]
    fn test_outcome_serialize() {
        let json = serde_json::to_string(&ExecutionOutcome::NumericResult(3)).unwrap();
        assert_eq!(json, r#"{"kind":"numeric_result","count":3}"#);

        let json = serde_json::to_string(&ExecutionOutcome::Failure).unwrap();
        assert_eq!(json, r#"{"kind":"failure"}"#);
    }

    #[test]
    fn test_run_status_from_stages() {
        use OutcomeStatus::{Failure, PartialSuccess, Success};

        assert_eq!(RunStatus::from_stages([Success, Success]), RunStatus::Success);
        assert_eq!(RunStatus::from_stages([Success, PartialSuccess]), RunStatus::Partial);
        assert_eq!(
            RunStatus::from_stages([PartialSuccess, Failure, Success]),
            RunStatus::Failure
        );
        assert_eq!(RunStatus::from_stages([]), RunStatus::Success);
    }
}
