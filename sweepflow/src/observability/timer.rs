//! Wall-clock timing for log fields.

use std::time::Instant;

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: &'static str,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Finishes the span, logs it at debug level and returns the duration.
    pub fn finish(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        tracing::debug!(span_name = self.name, duration_ms, "Span finished");
        duration_ms
    }
}
