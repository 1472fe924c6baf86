//! Status sink trait and implementations.

use crate::errors::SinkError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Trait for sinks that record stage and run outcomes.
///
/// Calls are fire-and-forget from the orchestrator's point of view: use
/// [`record_status`] and [`record_duration`], which log and swallow errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Records the outcome of a stage or run.
    ///
    /// # Arguments
    ///
    /// * `name` - Stage name or run name
    /// * `entries` - One line per attempt or stage
    /// * `status` - Aggregated status
    async fn log_status(&self, name: &str, entries: &[String], status: &str) -> Result<(), SinkError>;

    /// Records how long a stage or run took.
    async fn log_duration(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SinkError>;
}

impl std::fmt::Debug for dyn StatusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn StatusSink")
    }
}

/// Records a status, logging and suppressing any sink failure.
pub async fn record_status(sink: &dyn StatusSink, name: &str, entries: &[String], status: &str) {
    if let Err(e) = sink.log_status(name, entries, status).await {
        warn!(name, error = %e, "Failed to record status");
    }
}

/// Records a duration, logging and suppressing any sink failure.
pub async fn record_duration(sink: &dyn StatusSink, name: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
    if let Err(e) = sink.log_duration(name, start, end).await {
        warn!(name, error = %e, "Failed to record duration");
    }
}

/// A no-op sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatusSink;

#[async_trait]
impl StatusSink for NoOpStatusSink {
    async fn log_status(&self, _name: &str, _entries: &[String], _status: &str) -> Result<(), SinkError> {
        Ok(())
    }

    async fn log_duration(
        &self,
        _name: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A sink that writes records through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

#[async_trait]
impl StatusSink for TracingStatusSink {
    async fn log_status(&self, name: &str, entries: &[String], status: &str) -> Result<(), SinkError> {
        if status == "failure" {
            error!(name, status, ?entries, "Status recorded");
        } else {
            info!(name, status, ?entries, "Status recorded");
        }
        Ok(())
    }

    async fn log_duration(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        info!(
            name,
            start = %start.to_rfc3339(),
            end = %end.to_rfc3339(),
            duration_seconds = duration_seconds(start, end),
            "Duration recorded"
        );
        Ok(())
    }
}

/// A record written by [`JsonLinesStatusSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusRecord {
    /// Outcome of a stage or run.
    Status {
        /// Stage or run name.
        script_name: String,
        /// JSON-encoded list of entries.
        log_entry: String,
        /// When the record was written.
        timestamp: DateTime<Utc>,
        /// Aggregated status.
        status: String,
    },
    /// Duration of a stage or run.
    Duration {
        /// Stage or run name.
        script_name: String,
        /// Start time.
        start_time: DateTime<Utc>,
        /// End time.
        end_time: DateTime<Utc>,
        /// Elapsed seconds.
        duration_seconds: f64,
    },
}

/// A sink that appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesStatusSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesStatusSink {
    /// Opens (or creates) the log file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &StatusRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

#[async_trait]
impl StatusSink for JsonLinesStatusSink {
    async fn log_status(&self, name: &str, entries: &[String], status: &str) -> Result<(), SinkError> {
        self.append(&StatusRecord::Status {
            script_name: name.to_string(),
            log_entry: serde_json::to_string(entries)?,
            timestamp: Utc::now(),
            status: status.to_string(),
        })
    }

    async fn log_duration(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        self.append(&StatusRecord::Duration {
            script_name: name.to_string(),
            start_time: start,
            end_time: end,
            duration_seconds: duration_seconds(start, end),
        })
    }
}

/// A sink that forwards every record to several sinks.
///
/// Every sink is attempted; the first error is returned.
#[derive(Default)]
pub struct FanoutStatusSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl FanoutStatusSink {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if there are no sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutStatusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutStatusSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl StatusSink for FanoutStatusSink {
    async fn log_status(&self, name: &str, entries: &[String], status: &str) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.log_status(name, entries, status).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn log_duration(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.log_duration(name, start, end).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// A collected status call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedStatus {
    /// Stage or run name.
    pub name: String,
    /// Entries passed to the sink.
    pub entries: Vec<String>,
    /// Status passed to the sink.
    pub status: String,
}

/// A collecting sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingStatusSink {
    statuses: RwLock<Vec<CollectedStatus>>,
    durations: RwLock<Vec<String>>,
}

impl CollectingStatusSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected status calls.
    #[must_use]
    pub fn statuses(&self) -> Vec<CollectedStatus> {
        self.statuses.read().clone()
    }

    /// Returns the names passed to `log_duration`, in order.
    #[must_use]
    pub fn durations(&self) -> Vec<String> {
        self.durations.read().clone()
    }

    /// Returns status calls for one name.
    #[must_use]
    pub fn statuses_for(&self, name: &str) -> Vec<CollectedStatus> {
        self.statuses
            .read()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    /// Clears everything collected.
    pub fn clear(&self) {
        self.statuses.write().clear();
        self.durations.write().clear();
    }
}

#[async_trait]
impl StatusSink for CollectingStatusSink {
    async fn log_status(&self, name: &str, entries: &[String], status: &str) -> Result<(), SinkError> {
        self.statuses.write().push(CollectedStatus {
            name: name.to_string(),
            entries: entries.to_vec(),
            status: status.to_string(),
        });
        Ok(())
    }

    async fn log_duration(
        &self,
        name: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        self.durations.write().push(name.to_string());
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}
