//! Status recording for stages and runs.
//!
//! Sinks receive one status record and one duration record per stage and
//! per pipeline run. Sink failures never fail the pipeline.

mod sink;

pub use sink::{
    record_duration, record_status, CollectedStatus, CollectingStatusSink, FanoutStatusSink,
    JsonLinesStatusSink, NoOpStatusSink, StatusRecord, StatusSink, TracingStatusSink,
};

#[cfg(test)]
pub use sink::MockStatusSink;
