//! Running the external media tools as bounded subprocesses.

use std::{collections::VecDeque, io, process::ExitStatus, process::Stdio, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
    sync::Mutex,
};
use tracing::{debug, warn};

use crate::{errors::Error, media::types::CliInvocation, Result};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            match self.lines.pop_front() {
                Some(front) => self.bytes = self.bytes.saturating_sub(front.len() + 1),
                None => break,
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    /// Empty unless stdout was captured.
    pub stdout: String,
    pub stderr_tail: String,
}

impl ProcessOutput {
    /// Short failure text: the tool's `ERROR:` lines, else its last stderr line.
    pub fn error_summary(&self, label: &str) -> String {
        let errors: Vec<&str> = self
            .stderr_tail
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("ERROR"))
            .collect();
        if !errors.is_empty() {
            return errors.join("\n");
        }
        self.stderr_tail
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{label} exited with status {}", self.status))
    }
}

/// Spawn `inv`, wait at most `timeout`, and collect its output.
///
/// The child is killed on timeout and when the returned future is dropped.
/// A non-zero exit is not an error here; callers inspect `status`.
pub async fn run_captured(
    inv: &CliInvocation,
    label: &str,
    timeout: Duration,
    capture_stdout: bool,
) -> Result<ProcessOutput> {
    debug!(program = %inv.program.display(), args = ?inv.args, "spawning {label}");

    let mut cmd = Command::new(&inv.program);
    cmd.args(&inv.args)
        .stdin(Stdio::null())
        .stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::External(format!(
            "{label} not found at {}",
            inv.program.display()
        )),
        _ => Error::Io(e),
    })?;

    // Drain both pipes in the background so a full pipe never blocks the child.
    let stderr_tail = Arc::new(Mutex::new(StderrTail::default()));
    let stderr_task = child.stderr.take().map(|stderr| {
        let tail = stderr_tail.clone();
        tokio::spawn(async move {
            let mut r = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = r.next_line().await {
                tail.lock().await.push_line(line);
            }
        })
    });
    let stdout_task = child.stdout.take().map(|mut stdout| {
        tokio::spawn(async move {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).await.map(|_| buf)
        })
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "{label} timed out; killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill {label}");
            }
            return Err(Error::External(format!("{label} timed out after {timeout:?}")));
        }
    };

    let stdout = match stdout_task {
        Some(task) => task
            .await
            .map_err(|e| Error::External(format!("{label} stdout reader failed: {e}")))??,
        None => String::new(),
    };
    if let Some(task) = stderr_task {
        let _ = task.await;
    }
    let stderr_tail = stderr_tail.lock().await.snapshot();

    Ok(ProcessOutput {
        status,
        stdout,
        stderr_tail,
    })
}
