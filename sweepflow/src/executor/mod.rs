//! Redundant execution of a single stage.
//!
//! A stage is configured with a primary implementation and ordered
//! fallbacks. The executor tries them in order and stops at the first one
//! that completes, unless the run is forced, in which case every
//! implementation runs.

mod redundancy;

pub use redundancy::{ExecutionMode, RedundancyExecutor};
