/// Isolated Executor - one interpreter process per invocation
///
/// **Responsibility:**
/// Run the submission's entry point in a fresh `python3` process and bring
/// back either a return value or an error description.
///
/// **Process model:**
/// - The source, entry name and arguments go over stdin as one JSON request
/// - The reply comes back as the only JSON line on stdout
/// - Before the submission loads, the harness moves the reply channel to a
///   private duplicate of fd 1 and points fd 1 and `sys.stdout` at stderr, so
///   `print` and writes to fd 1 land in stderr
/// - The reply is accepted only from a worker that exits with status 0 and
///   writes exactly one line; anything extra on the reply channel voids it
/// - Code that reaches into the harness's own frames can still tamper with the
///   reply; there is no in-process boundary against that
/// - Environment is cleared down to `PATH`, the working directory is the
///   system temp dir, and the child is killed when its handle is dropped
///
/// Per-process state (globals, imported modules, monkey-patches) dies with
/// the process, so one test cannot affect another.
///
/// Deadlines are not enforced here; see `runner.rs`.

use crate::extractor::EntryPoint;
use pyjudge_common::types::Value;
use serde::{Deserialize, Serialize};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::debug;

const HARNESS: &str = include_str!("harness.py");

const MAX_STDOUT_BYTES: u64 = 4 * 1024 * 1024;
const MAX_STDERR_BYTES: u64 = 64 * 1024;
const STDERR_TAIL_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Load,
    Call,
}

#[derive(Serialize)]
struct WorkerRequest<'a> {
    mode: Mode,
    source: &'a str,
    entry: &'a str,
    args: &'a [Value],
}

/// What the harness reported back.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    Ready,
    LoadError { message: String },
    MissingEntry,
    Returned { output: Value },
    Raised { message: String },
}

/// Result of one completed invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Returned(Value),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct IsolatedExecutor {
    python_bin: String,
}

impl IsolatedExecutor {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
        }
    }

    /// Start a worker that calls the entry point with `args`.
    pub fn spawn(&self, entry: &EntryPoint, args: &[Value]) -> io::Result<WorkerProcess> {
        self.spawn_mode(Mode::Call, entry.source(), entry.name(), args)
    }

    /// Start a worker that only loads the source and resolves `entry_name`.
    pub(crate) fn spawn_probe(&self, source: &str, entry_name: &str) -> io::Result<WorkerProcess> {
        self.spawn_mode(Mode::Load, source, entry_name, &[])
    }

    fn spawn_mode(&self, mode: Mode, source: &str, entry: &str, args: &[Value]) -> io::Result<WorkerProcess> {
        let request = serde_json::to_vec(&WorkerRequest {
            mode,
            source,
            entry,
            args,
        })?;

        let mut command = Command::new(&self.python_bin);
        command
            .args(["-I", "-B", "-X", "utf8", "-c", HARNESS])
            .env_clear()
            .current_dir(std::env::temp_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let child = command.spawn()?;
        debug!(pid = child.id(), mode = ?mode, "Spawned worker");

        Ok(WorkerProcess {
            child,
            request: Some(request),
            started: Instant::now(),
        })
    }

    /// Run one invocation to completion with no deadline.
    pub async fn execute(&self, entry: &EntryPoint, args: &[Value]) -> io::Result<ExecutionOutcome> {
        let mut worker = self.spawn(entry, args)?;
        Ok(match worker.finish().await {
            Ok(WorkerReply::Returned { output }) => ExecutionOutcome::Returned(output),
            Ok(WorkerReply::Raised { message }) | Ok(WorkerReply::LoadError { message }) => {
                ExecutionOutcome::Failed(message)
            }
            Ok(other) => ExecutionOutcome::Failed(format!("unexpected worker reply: {:?}", other)),
            Err(crash) => ExecutionOutcome::Failed(crash),
        })
    }
}

/// A live worker process.
pub struct WorkerProcess {
    child: Child,
    request: Option<Vec<u8>>,
    started: Instant,
}

impl WorkerProcess {
    /// Feed the request, wait for exit and parse the reply.
    ///
    /// `Err` carries a description of a worker that died without replying.
    /// Cancel-safe with respect to the child: dropping the future leaves the
    /// process to `terminate` or to kill-on-drop.
    pub async fn finish(&mut self) -> Result<WorkerReply, String> {
        if let (Some(request), Some(mut stdin)) = (self.request.take(), self.child.stdin.take()) {
            // A worker that already exited closes the pipe; its exit status says why.
            if let Err(e) = stdin.write_all(&request).await {
                debug!(error = %e, "Worker stdin closed early");
            }
            drop(stdin);
        }

        let stdout = self.child.stdout.take();
        let stderr = self.child.stderr.take();
        let (status, stdout, stderr) = tokio::join!(
            self.child.wait(),
            read_capped(stdout, MAX_STDOUT_BYTES),
            read_capped(stderr, MAX_STDERR_BYTES),
        );
        let status = status.map_err(|e| format!("failed to wait for worker: {}", e))?;

        if !status.success() {
            return Err(crash_message(status, &stderr));
        }
        match reply_line(&stdout)? {
            Some(line) => serde_json::from_str(line)
                .map_err(|e| format!("malformed worker reply: {}", e)),
            None => Err(crash_message(status, &stderr)),
        }
    }

    pub async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Worker already gone");
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = (&mut reader).take(cap).read_to_end(&mut buf).await;
        // Keep draining so a chatty worker never blocks on a full pipe.
        let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
    }
    buf
}

fn reply_line(stdout: &[u8]) -> Result<Option<&str>, String> {
    let text = std::str::from_utf8(stdout).map_err(|_| "worker reply is not valid UTF-8".to_string())?;
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    match (lines.next(), lines.next()) {
        (first, None) => Ok(first),
        (_, Some(_)) => Err("worker wrote more than one reply line".to_string()),
    }
}

fn crash_message(status: ExitStatus, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    let skip = stderr.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    let tail: String = stderr.chars().skip(skip).collect();
    if tail.is_empty() {
        format!("worker exited with {} without a reply", status)
    } else {
        format!("worker exited with {} without a reply: {}", status, tail)
    }
}
