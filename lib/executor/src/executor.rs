//! Task Executor.
//!
//! Runs one task instance to completion, capturing its outcome. The
//! executor never lets a child process outlive its firing: on timeout it
//! signals termination, waits a grace period, then force-kills.

use chronoflow_core::{
    CapturedStream, ExecutionId, ExecutionStatus, JobId, EXIT_CODE_SPAWN_FAILURE,
    EXIT_CODE_TIMEOUT, MAX_CAPTURED_STREAM_BYTES,
};
use chronoflow_scheduler::{JobDefinition, TaskDescriptor};
use chrono::Utc;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Grace period between a SIGTERM and a force-kill on an ordinary
/// execution timeout. Shorter than the overall shutdown grace period,
/// since this only has to outlast one process, not a whole drain.
const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// The result of running one attempt of one firing.
pub struct Outcome {
    pub job_id: JobId,
    pub execution_id: ExecutionId,
    pub attempt: u32,
    pub command: String,
    pub start_time: chrono::DateTime<Utc>,
    pub end_time: chrono::DateTime<Utc>,
    pub status: ExecutionStatus,
    pub exit_code: i32,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
}

/// Runs one task attempt under a timeout.
pub async fn execute(
    job: &JobDefinition,
    execution_id: ExecutionId,
    attempt: u32,
    timeout: Duration,
) -> Outcome {
    let TaskDescriptor::ExecuteCommand { command } = &job.task;
    let start_time = Utc::now();

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Outcome {
                job_id: job.job_id.clone(),
                execution_id,
                attempt,
                command: command.clone(),
                start_time,
                end_time: Utc::now(),
                status: ExecutionStatus::Failure,
                exit_code: EXIT_CODE_SPAWN_FAILURE,
                stdout: CapturedStream::new(String::new(), 0),
                stderr: CapturedStream::new(format!("failed to spawn command: {e}"), 0),
            };
        }
    };

    let pid = child.id();
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let stdout_task = async {
                let mut buf = Vec::new();
                if let Some(pipe) = stdout_pipe.as_mut() {
                    let _ = pipe.read_to_end(&mut buf).await;
                }
                buf
            };
            let stderr_task = async {
                let mut buf = Vec::new();
                if let Some(pipe) = stderr_pipe.as_mut() {
                    let _ = pipe.read_to_end(&mut buf).await;
                }
                buf
            };
            let (stdout_bytes, stderr_bytes) = tokio::join!(stdout_task, stderr_task);

            let end_time = Utc::now();
            let exit_code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
            let success = exit_code == 0;
            Outcome {
                job_id: job.job_id.clone(),
                execution_id,
                attempt,
                command: command.clone(),
                start_time,
                end_time,
                status: if success {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failure
                },
                exit_code,
                stdout: capture(stdout_bytes),
                stderr: capture(stderr_bytes),
            }
        }
        Err(_elapsed) => {
            if let Some(pid) = pid {
                terminate_gracefully(pid).await;
            }
            let _ = tokio::time::timeout(Duration::from_millis(100), child.wait()).await;
            let end_time = Utc::now();
            Outcome {
                job_id: job.job_id.clone(),
                execution_id,
                attempt,
                command: command.clone(),
                start_time,
                end_time,
                status: ExecutionStatus::Failure,
                exit_code: EXIT_CODE_TIMEOUT,
                stdout: CapturedStream::new(String::new(), 0),
                stderr: CapturedStream::new(
                    format!("execution exceeded {}s timeout and was killed", timeout.as_secs()),
                    0,
                ),
            }
        }
    }
}

/// Sends SIGTERM, waits a grace period, then force-kills if the process
/// is still alive. Shelling out to `kill` keeps this free of a
/// platform-signal dependency the rest of the stack doesn't otherwise need.
async fn terminate_gracefully(pid: u32) {
    let _ = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .await;
    tokio::time::sleep(KILL_GRACE_PERIOD).await;
    let _ = Command::new("kill")
        .arg("-KILL")
        .arg(pid.to_string())
        .status()
        .await;
}

fn capture(bytes: Vec<u8>) -> CapturedStream {
    if bytes.len() <= MAX_CAPTURED_STREAM_BYTES {
        CapturedStream::new(String::from_utf8_lossy(&bytes).into_owned(), 0)
    } else {
        let truncated = bytes.len() - MAX_CAPTURED_STREAM_BYTES;
        let kept = &bytes[..MAX_CAPTURED_STREAM_BYTES];
        let mut data = String::from_utf8_lossy(kept).into_owned();
        data.push_str(&format!("\n[...truncated: {truncated} bytes dropped]"));
        CapturedStream::new(data, truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronoflow_core::JobId;

    fn job(command: &str) -> JobDefinition {
        JobDefinition {
            job_id: JobId::new("x").unwrap(),
            description: None,
            schedule: "* * * * *".to_string(),
            task: TaskDescriptor::ExecuteCommand {
                command: command.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn successful_command_is_success() {
        let outcome = execute(&job("echo hi"), ExecutionId::new(), 0, Duration::from_secs(5)).await;
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout.data, "hi\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let outcome = execute(&job("exit 3"), ExecutionId::new(), 0, Duration::from_secs(5)).await;
        assert_eq!(outcome.status, ExecutionStatus::Failure);
        assert_eq!(outcome.exit_code, 3);
    }

    #[tokio::test]
    async fn timeout_kills_process_and_records_sentinel() {
        let outcome = execute(
            &job("sleep 5"),
            ExecutionId::new(),
            0,
            Duration::from_millis(200),
        )
        .await;
        assert_eq!(outcome.status, ExecutionStatus::Failure);
        assert_eq!(outcome.exit_code, EXIT_CODE_TIMEOUT);
    }

    #[tokio::test]
    async fn captures_stderr_separately() {
        let outcome = execute(
            &job("echo out; echo err 1>&2"),
            ExecutionId::new(),
            0,
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome.stdout.data, "out\n");
        assert_eq!(outcome.stderr.data, "err\n");
    }
}
