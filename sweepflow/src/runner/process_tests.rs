//! Subprocess tests against real shell scripts.

use super::*;
use crate::config::RunnerConfig;
use crate::testing::write_script;
use std::path::Path;
use std::time::Duration;

fn runner(root: &Path, config: &RunnerConfig) -> SubprocessRunner {
    SubprocessRunner::new(ScriptResolver::new(root), config).unwrap()
}

#[tokio::test]
async fn test_numeric_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let _ = write_script(dir.path(), StageId::Fetch, "rss", "echo 7");
    let runner = runner(dir.path(), &RunnerConfig::default());

    let exit = runner.execute(StageId::Fetch, "rss", false).await.unwrap();
    assert_eq!(exit.status_code, Some(0));
    assert_eq!(exit.optional_count, Some(7));
    assert_eq!(classify(&exit), ExecutionOutcome::NumericResult(7));
}

#[tokio::test]
async fn test_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let _ = write_script(dir.path(), StageId::Tag, "ok", "echo tagged 4 articles");
    let _ = write_script(dir.path(), StageId::Tag, "partial", "echo some failed >&2\nexit 2");
    let _ = write_script(dir.path(), StageId::Tag, "broken", "exit 1");
    let runner = runner(dir.path(), &RunnerConfig::default());

    assert_eq!(runner.run(StageId::Tag, "ok", false).await, ExecutionOutcome::Success);
    assert_eq!(
        runner.run(StageId::Tag, "partial", false).await,
        ExecutionOutcome::PartialSuccess
    );
    assert_eq!(runner.run(StageId::Tag, "broken", false).await, ExecutionOutcome::Failure);
}

#[tokio::test]
async fn test_force_all_reaches_script() {
    let dir = tempfile::tempdir().unwrap();
    let _ = write_script(
        dir.path(),
        StageId::Scrape,
        "curl",
        r#"if [ "$SWEEPFLOW_FORCE_ALL" = "1" ] && [ "$1" = "--all" ]; then exit 0; fi
exit 1"#,
    );
    let config = RunnerConfig::default().with_force_all_arg("--all");
    let runner = runner(dir.path(), &config);

    assert_eq!(runner.run(StageId::Scrape, "curl", true).await, ExecutionOutcome::Success);
    assert_eq!(runner.run(StageId::Scrape, "curl", false).await, ExecutionOutcome::Failure);
}

#[tokio::test]
async fn test_negative_count_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let _ = write_script(dir.path(), StageId::Fetch, "rss", "echo -3");
    let runner = runner(dir.path(), &RunnerConfig::default());

    let exit = runner.execute(StageId::Fetch, "rss", false).await.unwrap();
    assert_eq!(exit.optional_count, Some(-3));
    assert_eq!(runner.run(StageId::Fetch, "rss", false).await, ExecutionOutcome::Failure);
}

#[tokio::test]
async fn test_output_beyond_capture_limit_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let _ = write_script(
        dir.path(),
        StageId::Scrape,
        "chatty",
        "head -c 5000000 /dev/zero | tr '\\000' x\nhead -c 300000 /dev/zero | tr '\\000' e >&2",
    );
    let _ = write_script(
        dir.path(),
        StageId::Fetch,
        "digits",
        "head -c 100000 /dev/zero | tr '\\000' 7",
    );
    let config = RunnerConfig {
        max_log_bytes: 1024,
        ..RunnerConfig::default()
    };
    let runner = runner(dir.path(), &config);

    let exit = runner.execute(StageId::Scrape, "chatty", false).await.unwrap();
    assert!(exit.output_truncated);
    assert_eq!(exit.stdout.len(), 1024);
    assert_eq!(exit.stderr.len(), 1024);
    assert_eq!(classify(&exit), ExecutionOutcome::Success);

    // A prefix of a long digit stream must not be read as a count.
    let exit = runner.execute(StageId::Fetch, "digits", false).await.unwrap();
    assert!(exit.output_truncated);
    assert_eq!(exit.optional_count, None);
    assert_eq!(classify(&exit), ExecutionOutcome::Success);
}

#[tokio::test]
async fn test_non_executable_script_fails_and_falls_back() {
    use crate::config::StageConfig;
    use crate::core::OutcomeStatus;
    use crate::errors::LaunchError;
    use crate::executor::RedundancyExecutor;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let locked = write_script(dir.path(), StageId::Summarize, "groq", "exit 0");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644)).unwrap();
    let _ = write_script(dir.path(), StageId::Summarize, "claude", "exit 0");
    let runner = Arc::new(runner(dir.path(), &RunnerConfig::default()));

    let err = runner.execute(StageId::Summarize, "groq", false).await.unwrap_err();
    assert!(matches!(err, LaunchError::Spawn { .. }));
    assert_eq!(runner.run(StageId::Summarize, "groq", false).await, ExecutionOutcome::Failure);

    let executor = RedundancyExecutor::new(runner as Arc<dyn ImplementationRunner>);
    let config = StageConfig::new(StageId::Summarize, "groq", ["claude"]);
    let result = executor.execute(&config, false).await;
    assert_eq!(result.attempted_implementations(), vec!["groq", "claude"]);
    assert_eq!(result.final_status, OutcomeStatus::Success);
}

/// True once `pid` has exited, counting unreaped zombies as gone.
#[cfg(target_os = "linux")]
fn process_gone(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .map_or(true, |rest| rest.trim_start().starts_with('Z')),
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_process_group() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("bg.pid");
    let _ = write_script(
        dir.path(),
        StageId::Scrape,
        "hang",
        &format!(
            "trap '' TERM\nsleep 30 &\necho $! > {}\nsleep 30\n",
            pidfile.display()
        ),
    );
    let config = RunnerConfig::default().with_timeouts(0.5, 1.0);
    let runner = runner(dir.path(), &config);

    let started = std::time::Instant::now();
    let exit = runner.execute(StageId::Scrape, "hang", false).await.unwrap();
    assert!(exit.timed_out);
    assert_eq!(classify(&exit), ExecutionOutcome::Failure);
    assert!(started.elapsed() < Duration::from_secs(10));

    let bg: u32 = std::fs::read_to_string(&pidfile).unwrap().trim().parse().unwrap();
    let mut gone = process_gone(bg);
    for _ in 0..20 {
        if gone {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        gone = process_gone(bg);
    }
    assert!(gone, "background process {bg} survived the timeout");
}
