// ABOUTME: Runs external tools in their own process group with bounded output capture.
// ABOUTME: On timeout, or when the caller drops the run, the whole group is killed.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// Captured output is truncated to the last 64 KiB per stream.
pub const OUTPUT_LIMIT: usize = 64 * 1024;

/// Finished process with its (tail of) output.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Both streams, stderr last, for error reports.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start process: {0}")]
    Spawn(std::io::Error),

    #[error("failed waiting for process: {0}")]
    Wait(std::io::Error),

    #[error("process timed out after {0:?}")]
    TimedOut(Duration),
}

/// Spawn `command`, wait for it (up to `timeout`), and capture its output.
pub async fn run_captured(
    mut command: Command,
    timeout: Option<Duration>,
) -> Result<Captured, ProcessError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    {
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(ProcessError::Spawn)?;
    // Declared after `child` so it fires while the group leader is still unreaped.
    let mut guard = GroupGuard { pid: child.id() };
    let stdout_task = tokio::spawn(read_tail(child.stdout.take()));
    let stderr_task = tokio::spawn(read_tail(child.stderr.take()));

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status.map_err(ProcessError::Wait)?,
            Err(_elapsed) => {
                tracing::warn!(pid = ?child.id(), "process exceeded {:?}, killing group", limit);
                terminate_group(&mut child).await;
                guard.disarm();
                stdout_task.abort();
                stderr_task.abort();
                return Err(ProcessError::TimedOut(limit));
            }
        },
        None => child.wait().await.map_err(ProcessError::Wait)?,
    };
    guard.disarm();

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(Captured {
        status,
        stdout,
        stderr,
    })
}

/// Kills the child's process group if the run is abandoned before the child is reaped.
///
/// `kill_on_drop` only reaches the direct child; build tools fork helpers that
/// would otherwise outlive a cancelled promotion.
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    /// The child was reaped; its pid may be reused from here on.
    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            tracing::debug!(pid, "run abandoned, killing process group");
            kill_group_now(pid);
        }
    }
}

#[cfg(unix)]
fn kill_group_now(pid: u32) {
    let killed = std::process::Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{pid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = killed {
        tracing::warn!("failed to kill process group {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_group_now(_pid: u32) {}

/// Kill the child's process group, then the child itself.
async fn terminate_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let group = format!("-{pid}");
            let killed = Command::new("kill")
                .args(["-s", "KILL", "--", &group])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = killed {
                tracing::warn!("failed to kill process group {}: {}", pid, e);
            }
        }
    }
    let _ = child.kill().await;
}

async fn read_tail<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };

    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                kept.extend_from_slice(&buf[..n]);
                if kept.len() > OUTPUT_LIMIT {
                    let excess = kept.len() - OUTPUT_LIMIT;
                    kept.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_both_streams() {
        let out = run_captured(sh("echo out; echo err >&2"), None).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.combined(), "out\n\nerr\n");
    }

    #[tokio::test]
    async fn reports_exit_status() {
        let out = run_captured(sh("exit 3"), None).await.unwrap();
        assert_eq!(out.status.code(), Some(3));
    }

    #[tokio::test]
    async fn times_out_and_kills() {
        let started = std::time::Instant::now();
        let err = run_captured(sh("sleep 30"), Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_a_run_kills_forked_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let beats = dir.path().join("beats");
        let script = format!(
            "(while true; do echo x >> '{}'; sleep 0.02; done) & wait",
            beats.display()
        );

        let abandoned =
            tokio::time::timeout(Duration::from_millis(300), run_captured(sh(&script), None)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let settled = std::fs::read(&beats).unwrap().len();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(std::fs::read(&beats).unwrap().len(), settled);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let err = run_captured(Command::new("/nonexistent/tool"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn(_)));
    }
}
