//! Scheduling of pipeline runs.
//!
//! This module provides:
//! - A single-flight queue that never runs two pipelines at once and
//!   collapses bursts of requests into one pending entry
//! - A trigger scheduler with a periodic full sweep and a frequent
//!   fetch-only check

mod queue;
mod triggers;

pub use queue::{
    EnqueueOutcome, QueueCounters, QueueEntry, QueueState, SchedulerState, SingleFlightQueue,
};
pub use triggers::{FetchCheckReport, TriggerScheduler, FETCH_CHECK_NAME};
