//! Cooperative shutdown.
//!
//! Scheduler loops and the queue worker select on a [`ShutdownToken`].
//! An in-flight pipeline run is never interrupted; loops stop at their
//! next suspension point.

mod token;

pub use token::ShutdownToken;
