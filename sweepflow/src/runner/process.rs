//! Subprocess execution with soft/hard timeouts.

use super::group::{signal_group, GroupSignal};
use super::{ImplementationRunner, ScriptResolver};
use crate::config::{RunnerConfig, SweepflowConfig};
use crate::core::{ExecutionOutcome, StageId};
use crate::errors::{ConfigError, LaunchError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Grace period for output pipes to close once the group has been killed.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Captured output never shrinks below this, so a count is always readable.
const MIN_CAPTURE_BYTES: usize = 64;

/// Exit code implementations use for "completed with recoverable issues".
pub const PARTIAL_EXIT_CODE: i32 = 2;

/// What a finished implementation process reported.
///
/// The exit code and the optional count are kept as separate fields; the
/// count is read from stdout only when stdout is a single integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` if the process was terminated by a signal.
    pub status_code: Option<i32>,
    /// Integer printed on stdout, if stdout was exactly one integer.
    pub optional_count: Option<i64>,
    /// Whether the soft or hard timeout fired.
    pub timed_out: bool,
    /// Captured stdout, possibly truncated.
    pub stdout: String,
    /// Captured stderr, possibly truncated.
    pub stderr: String,
    /// Whether either stream produced more than the capture limit.
    pub output_truncated: bool,
}

impl ProcessExit {
    /// Builds a process exit, extracting the count from stdout.
    #[must_use]
    pub fn new(status_code: Option<i32>, stdout: String, stderr: String, timed_out: bool) -> Self {
        Self {
            status_code,
            optional_count: parse_count(&stdout),
            timed_out,
            stdout,
            stderr,
            output_truncated: false,
        }
    }

    fn from_captured(status_code: Option<i32>, stdout: Captured, stderr: Captured, timed_out: bool) -> Self {
        let mut exit = Self::new(status_code, stdout.text, stderr.text, timed_out);
        if stdout.truncated {
            // A prefix of a longer stdout is not a count.
            exit.optional_count = None;
        }
        exit.output_truncated = stdout.truncated || stderr.truncated;
        exit
    }
}

/// Parses stdout as a single plain integer, ignoring surrounding whitespace.
#[must_use]
pub fn parse_count(stdout: &str) -> Option<i64> {
    stdout.trim().parse::<i64>().ok()
}

/// Classifies a process exit into an outcome.
///
/// Timeouts always fail, and so does a negative count. Otherwise a stdout
/// count wins over the exit code; exit 0 is success, exit 2 is partial
/// success, anything else fails.
#[must_use]
pub fn classify(exit: &ProcessExit) -> ExecutionOutcome {
    if exit.timed_out {
        return ExecutionOutcome::Failure;
    }
    if let Some(count) = exit.optional_count {
        return u64::try_from(count).map_or(ExecutionOutcome::Failure, ExecutionOutcome::NumericResult);
    }
    match exit.status_code {
        Some(0) => ExecutionOutcome::Success,
        Some(PARTIAL_EXIT_CODE) => ExecutionOutcome::PartialSuccess,
        _ => ExecutionOutcome::Failure,
    }
}

/// Runs implementations as child processes in their own process group.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    resolver: ScriptResolver,
    soft_timeout: Duration,
    hard_timeout: Duration,
    max_log_bytes: usize,
    capture_limit: usize,
    force_all_arg: Option<String>,
}

impl SubprocessRunner {
    /// Creates a runner from a resolver and runner settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeouts are invalid.
    pub fn new(resolver: ScriptResolver, config: &RunnerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            resolver,
            soft_timeout: config.soft_timeout()?,
            hard_timeout: config.hard_timeout()?,
            max_log_bytes: config.max_log_bytes,
            capture_limit: config.max_log_bytes.max(MIN_CAPTURE_BYTES),
            force_all_arg: config.force_all_arg.clone(),
        })
    }

    /// Creates a runner from the full orchestrator config.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeouts are invalid.
    pub fn from_config(config: &SweepflowConfig) -> Result<Self, ConfigError> {
        Self::new(ScriptResolver::from_config(config), &config.runner)
    }

    /// The resolver used to locate scripts.
    #[must_use]
    pub fn resolver(&self) -> &ScriptResolver {
        &self.resolver
    }

    /// Launches one implementation and waits for it, enforcing both timeouts.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] if the script is missing or cannot be spawned.
    pub async fn execute(
        &self,
        stage: StageId,
        implementation: &str,
        force_all: bool,
    ) -> Result<ProcessExit, LaunchError> {
        let invocation = self.resolver.resolve(stage, implementation)?;
        let program = invocation.program_name();

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .env("SWEEPFLOW_STAGE", stage.as_str())
            .env("SWEEPFLOW_FORCE_ALL", if force_all { "1" } else { "0" })
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if force_all {
            if let Some(arg) = &self.force_all_arg {
                command.arg(arg);
            }
        }
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pgid = child.id().unwrap_or(0);
        debug!(stage = %stage, implementation, pgid, program = %program, "Spawned implementation");

        let output = spawn_output_reader(child.stdout.take(), child.stderr.take(), self.capture_limit);

        let soft_deadline = started + self.soft_timeout;
        let hard_deadline = started + self.hard_timeout;
        let mut timed_out = false;

        let status = match timeout_at(soft_deadline, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                timed_out = true;
                warn!(stage = %stage, implementation, pgid, "Soft timeout reached, terminating process group");
                terminate(&mut child, pgid, GroupSignal::Terminate);
                match timeout_at(hard_deadline, child.wait()).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!(stage = %stage, implementation, pgid, "Hard timeout reached, killing process group");
                        terminate(&mut child, pgid, GroupSignal::Kill);
                        child.wait().await
                    }
                }
            }
        }
        .map_err(|source| LaunchError::Wait {
            program: program.clone(),
            source,
        })?;

        if timed_out {
            // Descendants that ignored SIGTERM must not outlive the runner.
            terminate(&mut child, pgid, GroupSignal::Kill);
        }

        let (stdout, stderr, held_open) = drain_output(output, hard_deadline, &mut child, pgid).await;
        if held_open && !timed_out {
            warn!(stage = %stage, implementation, pgid, "Descendants held output open past the hard timeout");
            timed_out = true;
        }

        let exit = ProcessExit::from_captured(status.code(), stdout, stderr, timed_out);
        if exit.output_truncated {
            debug!(stage = %stage, implementation, limit = self.capture_limit, "Output exceeded capture limit, excess discarded");
        }
        Ok(exit)
    }

    fn log_output(&self, stage: StageId, implementation: &str, exit: &ProcessExit) {
        let stdout = exit.stdout.trim();
        if !stdout.is_empty() {
            info!(stage = %stage, implementation, output = %truncate(stdout, self.max_log_bytes), "Script output");
        }
        let stderr = exit.stderr.trim();
        if !stderr.is_empty() {
            warn!(stage = %stage, implementation, output = %truncate(stderr, self.max_log_bytes), "Script error output");
        }
    }
}

#[async_trait]
impl ImplementationRunner for SubprocessRunner {
    async fn run(&self, stage: StageId, implementation: &str, force_all: bool) -> ExecutionOutcome {
        let exit = match self.execute(stage, implementation, force_all).await {
            Ok(exit) => exit,
            Err(e) => {
                error!(stage = %stage, implementation, error = %e, "Failed to run implementation");
                return ExecutionOutcome::Failure;
            }
        };

        self.log_output(stage, implementation, &exit);
        let outcome = classify(&exit);
        if exit.timed_out {
            error!(stage = %stage, implementation, "Implementation timed out");
        } else if exit.optional_count.is_some_and(|n| n < 0) {
            error!(stage = %stage, implementation, count = ?exit.optional_count, "Implementation reported a negative count");
        } else if outcome.is_failure() {
            error!(stage = %stage, implementation, exit_code = ?exit.status_code, "Implementation exited with failure");
        }
        outcome
    }
}

fn terminate(child: &mut Child, pgid: u32, signal: GroupSignal) {
    if let Err(e) = signal_group(pgid, signal) {
        warn!(pgid, error = %e, "Failed to signal process group");
    }
    if signal == GroupSignal::Kill || cfg!(not(unix)) {
        // Covers platforms without process groups and a failed killpg.
        let _ = child.start_kill();
    }
}

/// Output kept from one pipe.
#[derive(Debug, Default)]
struct Captured {
    text: String,
    truncated: bool,
}

fn spawn_output_reader(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    limit: usize,
) -> JoinHandle<(Captured, Captured)> {
    tokio::spawn(async move { tokio::join!(read_pipe(stdout, limit), read_pipe(stderr, limit)) })
}

/// Reads a pipe to EOF, keeping the first `limit` bytes and discarding the
/// rest so the writer never blocks on a full pipe.
async fn read_pipe<R>(pipe: Option<R>, limit: usize) -> Captured
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Captured::default();
    };
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
                truncated |= n > room;
            }
            Err(e) => {
                debug!(error = %e, "Output pipe read failed");
                break;
            }
        }
    }
    Captured {
        text: String::from_utf8_lossy(&kept).into_owned(),
        truncated,
    }
}

/// Collects captured output. Returns `held_open = true` if a descendant kept
/// the pipes open past the hard deadline and had to be killed.
async fn drain_output(
    mut output: JoinHandle<(Captured, Captured)>,
    hard_deadline: Instant,
    child: &mut Child,
    pgid: u32,
) -> (Captured, Captured, bool) {
    if let Ok(joined) = timeout_at(hard_deadline, &mut output).await {
        let (out, err) = joined.unwrap_or_default();
        return (out, err, false);
    }

    terminate(child, pgid, GroupSignal::Kill);
    match timeout(PIPE_DRAIN_GRACE, &mut output).await {
        Ok(joined) => {
            let (out, err) = joined.unwrap_or_default();
            (out, err, true)
        }
        Err(_) => {
            output.abort();
            (Captured::default(), Captured::default(), true)
        }
    }
}

fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
