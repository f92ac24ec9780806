//! Script Executor (spec.md §4.I).
//!
//! Grounded on the teacher's `ProcessorChain` background-task shape
//! (`crates/pipeline/src/processors/chain.rs`: spawn, stream output over
//! a channel, join on completion) — generalized from an in-process
//! processing chain into a child-process runner with bounded output
//! capture, periodic resource sampling, and timeout/cancellation via a
//! `tokio::sync::watch` signal.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::interval;

use shellwright_core::Platform;

/// Everything the executor needs to run one script, spec.md §4.I.
#[derive(Debug, Clone)]
pub struct PreparedScript {
    pub platform: Platform,
    pub script_path: PathBuf,
    pub interpreter_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout_seconds: u64,
    pub resource_sample_interval_ms: u64,
    pub grace_period_ms: u64,
    pub max_captured_bytes: usize,
}

/// How an execution's result deviated from a clean zero-exit run,
/// spec.md §7 and §3 state machine terminal reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecErrorKind {
    NonZeroExit,
    TimedOut,
    Cancelled,
    SpawnFailed,
}

/// Best-effort resource usage over the process lifetime, spec.md §4.I
/// ("missing metrics are null, not zero").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSample {
    pub peak_memory_bytes: Option<u64>,
    pub peak_cpu_percent: Option<f32>,
    pub io_read_bytes: Option<u64>,
    pub io_write_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated_bytes: Option<usize>,
    pub stderr_truncated_bytes: Option<usize>,
    pub resources: ResourceSample,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error_kind: Option<ExecErrorKind>,
}

struct CapturedStream {
    text: String,
    truncated_bytes: Option<usize>,
}

async fn drain_bounded<R: tokio::io::AsyncRead + Unpin>(mut reader: R, max_bytes: usize) -> CapturedStream {
    let mut buf = Vec::with_capacity(max_bytes.min(8192));
    let mut overflow: usize = 0;
    let mut chunk = [0u8; 4096];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = max_bytes.saturating_sub(buf.len());
                if room > 0 {
                    let take = room.min(n);
                    buf.extend_from_slice(&chunk[..take]);
                    overflow += n - take;
                } else {
                    overflow += n;
                }
            }
            Err(_) => break,
        }
    }

    CapturedStream {
        text: String::from_utf8_lossy(&buf).into_owned(),
        truncated_bytes: if overflow > 0 { Some(overflow) } else { None },
    }
}

/// Runs prepared scripts as child processes, spec.md §4.I.
pub struct ScriptExecutor;

impl ScriptExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Write `content` to a fresh temp file with the platform's
    /// conventional extension; the returned [`NamedTempFile`] deletes
    /// itself on drop.
    pub fn stage_script(&self, platform: Platform, content: &str) -> std::io::Result<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix("shellwright-")
            .suffix(&format!(".{}", platform.file_extension()))
            .tempfile()?;
        std::fs::write(file.path(), content)?;
        Ok(file)
    }

    /// Spawn `prepared`'s interpreter, stream output into bounded
    /// buffers, sample resources, and enforce the timeout/grace-period
    /// contract. `cancel` flips to `true` to request early termination.
    pub async fn run(&self, prepared: &PreparedScript, mut cancel: watch::Receiver<bool>) -> ExecutionResult {
        let started_at = Utc::now();
        let start_instant = Instant::now();

        let (interpreter, mut args) = prepared.platform.interpreter();
        args.extend(prepared.interpreter_args.iter().cloned());
        args.push(prepared.script_path.display().to_string());

        let mut command = Command::new(interpreter);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &prepared.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &prepared.env {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(_) => {
                return ExecutionResult {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    stdout_truncated_bytes: None,
                    stderr_truncated_bytes: None,
                    resources: ResourceSample::default(),
                    started_at,
                    finished_at: Utc::now(),
                    error_kind: Some(ExecErrorKind::SpawnFailed),
                };
            }
        };

        let pid = child.id();
        let stdout = child.stdout.take().map(BufReader::new);
        let stderr = child.stderr.take().map(BufReader::new);
        let max_captured_bytes = prepared.max_captured_bytes;

        let stdout_task = tokio::spawn(async move {
            match stdout {
                Some(reader) => drain_bounded(reader, max_captured_bytes).await,
                None => CapturedStream { text: String::new(), truncated_bytes: None },
            }
        });
        let stderr_task = tokio::spawn(async move {
            match stderr {
                Some(reader) => drain_bounded(reader, max_captured_bytes).await,
                None => CapturedStream { text: String::new(), truncated_bytes: None },
            }
        });

        let mut resources = ResourceSample::default();
        let mut sampler = System::new();
        let mut sample_ticker = interval(Duration::from_millis(prepared.resource_sample_interval_ms.max(50)));
        let timeout = Duration::from_secs(prepared.timeout_seconds);

        let error_kind;
        let exit_code;
        loop {
            tokio::select! {
                result = child.wait() => {
                    exit_code = result.ok().and_then(|s| s.code());
                    error_kind = match exit_code {
                        Some(0) => None,
                        Some(_) => Some(ExecErrorKind::NonZeroExit),
                        None => Some(ExecErrorKind::Cancelled),
                    };
                    break;
                }
                _ = sample_ticker.tick() => {
                    if let Some(pid) = pid {
                        sample_resources(&mut sampler, pid, &mut resources);
                    }
                    if start_instant.elapsed() >= timeout {
                        exit_code = terminate_with_grace(&mut child, prepared.grace_period_ms).await;
                        error_kind = Some(ExecErrorKind::TimedOut);
                        break;
                    }
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        exit_code = terminate_with_grace(&mut child, prepared.grace_period_ms).await;
                        error_kind = Some(ExecErrorKind::Cancelled);
                        break;
                    }
                }
            }
        }

        let stdout = stdout_task.await.unwrap_or(CapturedStream { text: String::new(), truncated_bytes: None });
        let stderr = stderr_task.await.unwrap_or(CapturedStream { text: String::new(), truncated_bytes: None });

        ExecutionResult {
            exit_code,
            stdout: stdout.text,
            stderr: stderr.text,
            stdout_truncated_bytes: stdout.truncated_bytes,
            stderr_truncated_bytes: stderr.truncated_bytes,
            resources,
            started_at,
            finished_at: Utc::now(),
            error_kind,
        }
    }
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn sample_resources(sampler: &mut System, pid: u32, resources: &mut ResourceSample) {
    let sys_pid = Pid::from_u32(pid);
    sampler.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[sys_pid]), true);

    let Some(process) = sampler.process(sys_pid) else {
        return;
    };

    let memory = process.memory();
    resources.peak_memory_bytes = Some(resources.peak_memory_bytes.unwrap_or(0).max(memory));

    let cpu = process.cpu_usage();
    resources.peak_cpu_percent = Some(resources.peak_cpu_percent.unwrap_or(0.0).max(cpu));

    let disk = process.disk_usage();
    resources.io_read_bytes = Some(disk.total_read_bytes);
    resources.io_write_bytes = Some(disk.total_written_bytes);
}

/// Send a graceful stop, then force-kill if still alive after
/// `grace_period_ms`, spec.md §4.I.
async fn terminate_with_grace(child: &mut tokio::process::Child, grace_period_ms: u64) -> Option<i32> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid as NixPid;
            let _ = kill(NixPid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    let grace = Duration::from_millis(grace_period_ms);
    if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
        return status.ok().and_then(|s| s.code());
    }

    let _ = child.kill().await;
    child.wait().await.ok().and_then(|s| s.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(path: PathBuf, timeout_seconds: u64) -> PreparedScript {
        PreparedScript {
            platform: Platform::Bash,
            script_path: path,
            interpreter_args: vec![],
            working_dir: None,
            env: HashMap::new(),
            timeout_seconds,
            resource_sample_interval_ms: 50,
            grace_period_ms: 200,
            max_captured_bytes: 64 * 1024,
        }
    }

    #[tokio::test]
    async fn runs_a_script_and_captures_stdout() {
        let executor = ScriptExecutor::new();
        let file = executor.stage_script(Platform::Bash, "echo hello-from-script\n").unwrap();
        assert!(file.path().exists());

        let (_tx, rx) = watch::channel(false);
        let result = executor.run(&prepared(file.path().to_path_buf(), 5), rx).await;

        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello-from-script"));
        assert_eq!(result.error_kind, None);
    }

    #[tokio::test]
    async fn nonzero_exit_is_classified_non_zero_exit() {
        let executor = ScriptExecutor::new();
        let file = executor.stage_script(Platform::Bash, "exit 3\n").unwrap();

        let (_tx, rx) = watch::channel(false);
        let result = executor.run(&prepared(file.path().to_path_buf(), 5), rx).await;

        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.error_kind, Some(ExecErrorKind::NonZeroExit));
    }

    #[tokio::test]
    async fn timeout_terminates_long_running_script() {
        let executor = ScriptExecutor::new();
        let file = executor.stage_script(Platform::Bash, "sleep 30\n").unwrap();

        let (_tx, rx) = watch::channel(false);
        let result = executor.run(&prepared(file.path().to_path_buf(), 1), rx).await;

        assert_eq!(result.error_kind, Some(ExecErrorKind::TimedOut));
    }

    #[tokio::test]
    async fn cancel_signal_terminates_running_script() {
        let executor = ScriptExecutor::new();
        let file = executor.stage_script(Platform::Bash, "sleep 30\n").unwrap();

        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn(async move { executor.run(&prepared(file.path().to_path_buf(), 30), rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let result = run.await.unwrap();
        assert_eq!(result.error_kind, Some(ExecErrorKind::Cancelled));
    }
}
