//! Pipeline chain execution.
//!
//! A pipeline run is one traversal of fetch, scrape, summarize and tag.
//! Every stage runs regardless of how the previous one ended.

mod chain;

pub use chain::{PipelineChain, PIPELINE_RUN_NAME};
