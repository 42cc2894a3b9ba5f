//! Bounded execution of transfer-engine subprocesses.

use std::{
    process::Stdio,
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};

/// Cap on captured output per stream (64 KiB). Output past the cap is read
/// and discarded so the child never writes into a closed pipe.
const MAX_OUTPUT_BYTES: u64 = 64 * 1024;

#[derive(Debug)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    /// stdout followed by stderr.
    pub combined: String,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start process: {0}")]
    Spawn(std::io::Error),
    #[error("failed waiting for process: {0}")]
    Wait(std::io::Error),
    #[error("process exceeded its deadline of {deadline:?}")]
    Timeout { deadline: Duration },
}

/// Spawn `cmd`, capture its output and kill it if it outlives `deadline`.
pub async fn run_with_deadline(
    cmd: &mut Command,
    deadline: Duration,
) -> Result<CommandOutput, ProcessError> {
    // Dropping the child on timeout kills it.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(ProcessError::Spawn)?;

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    match tokio::time::timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            let mut combined = String::from_utf8_lossy(&stdout).into_owned();
            if !stderr.is_empty() {
                if !combined.is_empty() && !combined.ends_with('\n') {
                    combined.push('\n');
                }
                combined.push_str(&String::from_utf8_lossy(&stderr));
            }
            Ok(CommandOutput {
                exit_code: status.code(),
                success: status.success(),
                combined,
                elapsed: start.elapsed(),
            })
        }
        Ok(Err(err)) => Err(ProcessError::Wait(err)),
        Err(_elapsed) => {
            stdout_task.abort();
            stderr_task.abort();
            Err(ProcessError::Timeout { deadline })
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = run_with_deadline(&mut cmd, Duration::from_secs(10))
            .await
            .expect("run");
        assert!(!output.success);
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.combined, "out\nerr\n");
    }

    #[tokio::test]
    async fn large_output_is_capped_without_breaking_the_pipe() {
        let mut cmd = Command::new("sh");
        cmd.args([
            "-c",
            "i=0; while [ $i -lt 20000 ]; do echo \"file-$i.txt\"; i=$((i+1)); done",
        ]);
        let output = run_with_deadline(&mut cmd, Duration::from_secs(30))
            .await
            .expect("run");
        assert!(output.success, "exit code {:?}", output.exit_code);
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.combined.len() as u64, MAX_OUTPUT_BYTES);
        assert!(output.combined.starts_with("file-0.txt\n"));
    }

    #[tokio::test]
    async fn kills_process_past_deadline() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 10"]);
        let started = Instant::now();
        let err = run_with_deadline(&mut cmd, Duration::from_millis(200))
            .await
            .expect_err("should time out");
        assert!(matches!(err, ProcessError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let mut cmd = Command::new("/nonexistent/tether-test-binary");
        let err = run_with_deadline(&mut cmd, Duration::from_secs(1))
            .await
            .expect_err("should not spawn");
        assert!(matches!(err, ProcessError::Spawn(_)));
    }
}
