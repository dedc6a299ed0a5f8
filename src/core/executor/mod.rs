//! Subprocess execution with a hard wall-clock bound.
//!
//! Each child runs in its own process group so that a timeout can take down
//! everything it started, not just the direct child. Output is drained
//! concurrently in byte chunks into capped buffers; whatever was captured
//! before a kill is kept.

use crate::core::entities::{ExecutionResult, ExecutionSpec, ExecutionStatus};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Per-stream capture cap; bytes past it are discarded.
pub const OUTPUT_CAPTURE_LIMIT_BYTES: usize = 1_048_576;

/// How long readers may keep draining after the child is gone.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How long to wait for a killed child to be reaped.
pub const REAP_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Seam between the request handler and real process spawning.
#[async_trait]
pub trait ProcessRunner: Send + Sync + 'static {
    async fn run(&self, spec: &ExecutionSpec) -> ExecutionResult;
}

pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &ExecutionSpec) -> ExecutionResult {
        execute(spec).await
    }
}

#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Capture {
    fn push(&mut self, chunk: &[u8]) {
        let room = OUTPUT_CAPTURE_LIMIT_BYTES.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Kills the child's process group when dropped while armed, so an aborted
/// request task cannot leave grandchildren behind.
struct ProcessGroupGuard {
    pgid: Option<i32>,
    armed: bool,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<i32>) -> Self {
        Self { pgid, armed: true }
    }

    fn kill(&self) {
        if let Some(pgid) = self.pgid {
            kill_process_group(pgid);
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if self.armed {
            self.kill();
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: i32) {
    if pgid <= 0 {
        return;
    }
    // ESRCH just means the group is already gone.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: i32) {}

fn build_command(spec: &ExecutionSpec) -> Command {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .env_clear()
        .envs(&spec.env)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    command
}

fn spawn_reader<R>(mut reader: R, capture: SharedCapture) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => capture
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(&buf[..n]),
                Err(err) => {
                    debug!(error = %err, "output stream read failed");
                    break;
                }
            }
        }
    })
}

/// Map an exit status to a code; a signal death becomes `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn status_from_exit(status: ExitStatus) -> ExecutionStatus {
    match exit_code(status) {
        0 => ExecutionStatus::Success,
        code => ExecutionStatus::NonZeroExit { code },
    }
}

async fn reap(child: &mut Child) {
    let _ = child.start_kill();
    if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
        warn!(pid = ?child.id(), "killed subprocess was not reaped in time");
    }
}

async fn drain(readers: Vec<JoinHandle<()>>) {
    let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();
    let joined = tokio::time::timeout(DRAIN_GRACE, async move {
        for reader in readers {
            let _ = reader.await;
        }
    })
    .await;
    if joined.is_err() {
        debug!("output streams still open after grace period; abandoning them");
        for abort in aborts {
            abort.abort();
        }
    }
}

fn take(capture: &SharedCapture) -> (Vec<u8>, bool) {
    let mut capture = capture.lock().unwrap_or_else(PoisonError::into_inner);
    (std::mem::take(&mut capture.bytes), capture.truncated)
}

/// Run one subprocess to completion or until `spec.timeout` elapses.
///
/// Never returns while the child or anything in its process group is still
/// known to be running.
pub async fn execute(spec: &ExecutionSpec) -> ExecutionResult {
    let start = Instant::now();

    let mut child = match build_command(spec).spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(program = %spec.program, error = %err, "failed to spawn subprocess");
            return ExecutionResult::spawn_failure(
                format!("failed to start '{}': {}", spec.program, err),
                start.elapsed(),
            );
        }
    };

    let pgid = child.id().map(|id| id as i32);
    let mut guard = ProcessGroupGuard::new(pgid);
    debug!(
        program = %spec.program,
        pid = ?pgid,
        cwd = %spec.cwd.display(),
        timeout_ms = spec.timeout.as_millis() as u64,
        "spawned subprocess"
    );

    let stdout = SharedCapture::default();
    let stderr = SharedCapture::default();
    let mut readers = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
        readers.push(spawn_reader(out, stdout.clone()));
    }
    if let Some(err) = child.stderr.take() {
        readers.push(spawn_reader(err, stderr.clone()));
    }

    let status = match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(Ok(exit)) => {
            // Sweep anything the child left running in its group.
            guard.kill();
            status_from_exit(exit)
        }
        Ok(Err(err)) => {
            warn!(program = %spec.program, error = %err, "failed to wait for subprocess");
            guard.kill();
            reap(&mut child).await;
            ExecutionStatus::SpawnFailure {
                error: format!("failed to wait for '{}': {}", spec.program, err),
            }
        }
        Err(_) => {
            warn!(
                program = %spec.program,
                pid = ?pgid,
                timeout_ms = spec.timeout.as_millis() as u64,
                "subprocess timed out; killing process group"
            );
            guard.kill();
            reap(&mut child).await;
            ExecutionStatus::TimedOut
        }
    };
    guard.disarm();

    drain(readers).await;

    let (stdout, stdout_truncated) = take(&stdout);
    let (stderr, stderr_truncated) = take(&stderr);

    ExecutionResult {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        elapsed: start.elapsed(),
    }
}
