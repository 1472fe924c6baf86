//! Observability utilities.

mod logging;
mod timer;

pub use logging::{env_filter, init_logging, LogFormat};
pub use timer::SpanTimer;
