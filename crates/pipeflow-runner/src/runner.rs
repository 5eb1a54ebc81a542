//! Supervised execution of one scheduled job.
//!
//! The runner owns the full lifecycle of an attempt: resolve the
//! command line, spawn the child, stream its merged output into the
//! daily log while scanning for error markers, enforce the schedule's
//! wall-clock cap, persist the result, and raise a notification on
//! anything other than success. A failing job never propagates an
//! error to the run-loop.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use pipeflow_core::ToolPaths;
use pipeflow_notify::Notifier;
use pipeflow_store::{Schedule, ScheduleStore};

use crate::adapter::build_invocation;
use crate::error::Result;
use crate::log::DailyLog;
use crate::types::{ExecutionResult, Outcome};

/// How many marker lines a failure notification carries.
const NOTIFY_ERROR_LINES: usize = 5;

pub struct JobRunner {
    store: ScheduleStore,
    notifier: Arc<dyn Notifier>,
    log: Arc<DailyLog>,
    tools: ToolPaths,
}

impl JobRunner {
    pub fn new(
        store: ScheduleStore,
        notifier: Arc<dyn Notifier>,
        log: Arc<DailyLog>,
        tools: ToolPaths,
    ) -> Self {
        Self {
            store,
            notifier,
            log,
            tools,
        }
    }

    /// Execute one schedule to completion. Never fails: every path
    /// ends with the result persisted and, when the run did not
    /// succeed, a notification sent.
    pub async fn run(&self, schedule: &Schedule) -> ExecutionResult {
        info!(
            schedule_id = schedule.id,
            artifact = schedule.artifact_name(),
            tool = %schedule.tool,
            "starting job"
        );
        let result = self.execute(schedule).await;

        let completed_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        if let Err(e) =
            self.store
                .record_execution(schedule.id, result.duration_minutes, &completed_at)
        {
            error!(schedule_id = schedule.id, "failed to persist result: {e}");
        }

        if result.outcome.is_success() {
            info!(
                schedule_id = schedule.id,
                duration_minutes = result.duration_minutes,
                "job finished"
            );
        } else {
            warn!(
                schedule_id = schedule.id,
                outcome = %result.outcome,
                exit_code = ?result.exit_code,
                "job did not succeed"
            );
            self.notifier
                .notify(&failure_message(schedule, &result))
                .await;
        }
        result
    }

    /// Manual trigger surface: fetch by ID, then run through the same
    /// path the scheduler uses.
    pub async fn run_by_id(&self, id: i64) -> Result<ExecutionResult> {
        let schedule = self.store.get(id)?;
        Ok(self.run(&schedule).await)
    }

    async fn execute(&self, schedule: &Schedule) -> ExecutionResult {
        let started = Instant::now();

        if !Path::new(&schedule.file_path).exists() {
            return launch_failure(
                started,
                format!("artifact not found: {}", schedule.file_path),
            );
        }

        let invocation = match build_invocation(schedule, &self.tools) {
            Ok(inv) => inv,
            Err(e) => return launch_failure(started, e.to_string()),
        };

        let mut child = match tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(invocation.env.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return launch_failure(
                    started,
                    format!("failed to spawn {}: {e}", invocation.program),
                )
            }
        };

        let pid = child.id().unwrap_or_default();
        let error_lines = Arc::new(Mutex::new(Vec::new()));

        let out_task = child.stdout.take().map(|out| {
            stream_output(
                out,
                pid,
                Arc::clone(&self.log),
                invocation.error_markers,
                Arc::clone(&error_lines),
            )
        });
        let err_task = child.stderr.take().map(|err| {
            stream_output(
                err,
                pid,
                Arc::clone(&self.log),
                invocation.error_markers,
                Arc::clone(&error_lines),
            )
        });

        let deadline = Duration::from_secs(schedule.timeout_seconds);
        let (forced, exit_code) = match tokio::time::timeout(deadline, child.wait()).await {
            Ok(Ok(status)) => (None, status.code()),
            Ok(Err(e)) => {
                push_line(&error_lines, format!("wait failed: {e}"));
                (Some(Outcome::Failed), None)
            }
            Err(_) => {
                warn!(
                    schedule_id = schedule.id,
                    pid, "wall-clock cap reached, killing job"
                );
                if let Err(e) = child.start_kill() {
                    error!(pid, "kill failed: {e}");
                }
                // Reap so the readers see EOF and drain what is left.
                let _ = child.wait().await;
                (Some(Outcome::TimedOut), None)
            }
        };

        if let Some(task) = out_task {
            let _ = task.await;
        }
        if let Some(task) = err_task {
            let _ = task.await;
        }

        let error_lines = match error_lines.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let outcome = forced.unwrap_or(if exit_code == Some(0) && error_lines.is_empty() {
            Outcome::Success
        } else {
            Outcome::Failed
        });

        ExecutionResult {
            outcome,
            exit_code,
            duration_minutes: elapsed_minutes(started),
            error_lines,
        }
    }
}

/// Copy one output stream into the daily log line by line, collecting
/// the lines that match an error marker. Stdout and stderr each get
/// their own task; the `[PID n]` prefix keeps interleaved runs
/// attributable.
fn stream_output<R>(
    reader: R,
    pid: u32,
    log: Arc<DailyLog>,
    markers: &'static [&'static str],
    error_lines: Arc<Mutex<Vec<String>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Err(e) = log.write_line(&format!("[PID {pid}] {line}")) {
                        warn!(pid, "daily log write failed: {e}");
                    }
                    let upper = line.to_uppercase();
                    if markers.iter().any(|m| upper.contains(m)) {
                        push_line(&error_lines, line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(pid, "output stream read failed: {e}");
                    break;
                }
            }
        }
    })
}

fn push_line(lines: &Arc<Mutex<Vec<String>>>, line: String) {
    match lines.lock() {
        Ok(mut g) => g.push(line),
        Err(poisoned) => poisoned.into_inner().push(line),
    }
}

fn launch_failure(started: Instant, reason: String) -> ExecutionResult {
    ExecutionResult {
        outcome: Outcome::LaunchFailed,
        exit_code: None,
        duration_minutes: elapsed_minutes(started),
        error_lines: vec![reason],
    }
}

fn elapsed_minutes(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() / 60.0 * 100.0).round() / 100.0
}

fn failure_message(schedule: &Schedule, result: &ExecutionResult) -> String {
    let mut msg = format!(
        "Scheduled job '{}' {}",
        schedule.artifact_name(),
        result.outcome
    );
    if let Some(code) = result.exit_code {
        msg.push_str(&format!(" (exit code {code})"));
    }
    let skip = result.error_lines.len().saturating_sub(NOTIFY_ERROR_LINES);
    for line in result.error_lines.iter().skip(skip) {
        msg.push('\n');
        msg.push_str(line);
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeflow_store::{ScheduleStatus, Tool};
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        count: AtomicUsize,
        last: Mutex<String>,
    }

    impl Recording {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
                last: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, message: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = message.to_string();
        }
    }

    struct Fixture {
        runner: JobRunner,
        store: ScheduleStore,
        notifier: Arc<Recording>,
        log: Arc<DailyLog>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let notifier = Recording::new();
        let log = Arc::new(DailyLog::new(dir.path().join("logs")).unwrap());
        let runner = JobRunner::new(
            store.clone(),
            notifier.clone(),
            Arc::clone(&log),
            ToolPaths {
                kitchen: "/nonexistent/kitchen.sh".into(),
                pan: "/nonexistent/pan.sh".into(),
                hop_run: "/nonexistent/hop-run.sh".into(),
                needs_shell: false,
            },
        );
        Fixture {
            runner,
            store,
            notifier,
            log,
            _dir: dir,
        }
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn command_schedule(fx: &Fixture, file_path: String, timeout: u64) -> Schedule {
        fx.store
            .add(Schedule {
                id: 0,
                file_path,
                tool: Tool::Command,
                project: None,
                run_config: None,
                fixed_time: None,
                interval_minutes: 0,
                weekdays: vec![],
                month_days: vec![],
                window_start: None,
                window_end: None,
                status: ScheduleStatus::Active,
                timeout_seconds: timeout,
                last_run_at: None,
                last_run_duration_minutes: None,
            })
            .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_is_success_and_recorded() {
        let fx = fixture();
        let path = script(fx._dir.path(), "ok.sh", "echo all good");
        let schedule = command_schedule(&fx, path, 30);

        let result = fx.runner.run(&schedule).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.error_lines.is_empty());
        assert_eq!(fx.notifier.count.load(Ordering::SeqCst), 0);

        let stored = fx.store.get(schedule.id).unwrap();
        assert!(stored.last_run_at.is_some());
        assert!(stored.last_run_duration_minutes.is_some());

        let content = std::fs::read_to_string(fx.log.today_path()).unwrap();
        assert!(content.contains("all good"));
        assert!(content.contains("[PID "));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn marker_line_fails_run_despite_exit_zero() {
        let fx = fixture();
        let path = script(fx._dir.path(), "bad.sh", "echo 'ERROR: disk full'\nexit 0");
        let schedule = command_schedule(&fx, path, 30);

        let result = fx.runner.run(&schedule).await;

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.error_lines, vec!["ERROR: disk full"]);

        assert_eq!(fx.notifier.count.load(Ordering::SeqCst), 1);
        let message = fx.notifier.last.lock().unwrap().clone();
        assert!(message.contains("bad.sh"));
        assert!(message.contains("ERROR: disk full"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_fails_run() {
        let fx = fixture();
        let path = script(fx._dir.path(), "exit3.sh", "exit 3");
        let schedule = command_schedule(&fx, path, 30);

        let result = fx.runner.run(&schedule).await;

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(fx.notifier.count.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn wall_clock_cap_kills_the_job() {
        let fx = fixture();
        let path = script(fx._dir.path(), "slow.sh", "sleep 30");
        let schedule = command_schedule(&fx, path, 1);

        let result = fx.runner.run(&schedule).await;

        assert_eq!(result.outcome, Outcome::TimedOut);
        assert!(result.exit_code.is_none());
        assert_eq!(fx.notifier.count.load(Ordering::SeqCst), 1);

        // The attempt is persisted even though it was killed.
        let stored = fx.store.get(schedule.id).unwrap();
        assert!(stored.last_run_at.is_some());
    }

    #[tokio::test]
    async fn missing_artifact_is_launch_failure() {
        let fx = fixture();
        let schedule = command_schedule(&fx, "/nonexistent/job.sh".into(), 30);

        let result = fx.runner.run(&schedule).await;

        assert_eq!(result.outcome, Outcome::LaunchFailed);
        assert_eq!(fx.notifier.count.load(Ordering::SeqCst), 1);
        let message = fx.notifier.last.lock().unwrap().clone();
        assert!(message.contains("artifact not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_by_id_uses_the_same_path() {
        let fx = fixture();
        let path = script(fx._dir.path(), "ok.sh", "echo done");
        let schedule = command_schedule(&fx, path, 30);

        let result = fx.runner.run_by_id(schedule.id).await.unwrap();
        assert_eq!(result.outcome, Outcome::Success);

        assert!(fx.runner.run_by_id(9999).await.is_err());
    }

    #[test]
    fn failure_message_keeps_last_five_marker_lines() {
        let schedule = Schedule {
            id: 1,
            file_path: "/flows/load.kjb".into(),
            tool: Tool::Pdi,
            project: None,
            run_config: None,
            fixed_time: None,
            interval_minutes: 0,
            weekdays: vec![],
            month_days: vec![],
            window_start: None,
            window_end: None,
            status: ScheduleStatus::Active,
            timeout_seconds: 1800,
            last_run_at: None,
            last_run_duration_minutes: None,
        };
        let result = ExecutionResult {
            outcome: Outcome::Failed,
            exit_code: Some(1),
            duration_minutes: 0.5,
            error_lines: (0..8).map(|i| format!("ERROR line {i}")).collect(),
        };

        let message = failure_message(&schedule, &result);
        assert!(message.contains("load.kjb"));
        assert!(message.contains("exit code 1"));
        assert!(!message.contains("ERROR line 2"));
        assert!(message.contains("ERROR line 3"));
        assert!(message.contains("ERROR line 7"));
    }
}
