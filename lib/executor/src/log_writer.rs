//! Execution Log Writer.
//!
//! Writes one file per execution attempt to
//! `<log_root>/<job_id>/<execution_id>-<attempt>.log`, buffered in memory
//! during the run and flushed in a single write on completion. `attempt` is
//! part of the filename because `execution_id` identifies the firing, not
//! the attempt: a retried firing reuses the same `execution_id` across every
//! attempt, so the attempt number is what keeps each record's file distinct.

use crate::executor::Outcome;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LogWriteError {
    pub path: PathBuf,
    pub reason: io::Error,
}

impl fmt::Display for LogWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution log {}: {}", self.path.display(), self.reason)
    }
}

impl std::error::Error for LogWriteError {}

/// Writes [`Outcome`]s under `log_root`.
pub struct LogWriter {
    log_root: PathBuf,
}

impl LogWriter {
    #[must_use]
    pub fn new(log_root: PathBuf) -> Self {
        Self { log_root }
    }

    /// Writes one execution record, creating `<log_root>/<job_id>/` if
    /// needed (mode 0755 on unix).
    pub fn write(&self, outcome: &Outcome) -> Result<PathBuf, LogWriteError> {
        let job_dir = self.log_root.join(outcome.job_id.as_str());
        self.ensure_job_dir(&job_dir)?;
        let path = job_dir.join(format!("{}-{}.log", outcome.execution_id, outcome.attempt));
        let contents = render(outcome);
        std::fs::write(&path, contents).map_err(|e| LogWriteError {
            path: path.clone(),
            reason: e,
        })?;
        Ok(path)
    }

    #[cfg(unix)]
    fn ensure_job_dir(&self, job_dir: &Path) -> Result<(), LogWriteError> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(job_dir).map_err(|e| LogWriteError {
            path: job_dir.to_path_buf(),
            reason: e,
        })?;
        std::fs::set_permissions(job_dir, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
            LogWriteError {
                path: job_dir.to_path_buf(),
                reason: e,
            }
        })
    }

    #[cfg(not(unix))]
    fn ensure_job_dir(&self, job_dir: &Path) -> Result<(), LogWriteError> {
        std::fs::create_dir_all(job_dir).map_err(|e| LogWriteError {
            path: job_dir.to_path_buf(),
            reason: e,
        })
    }
}

fn render(outcome: &Outcome) -> String {
    let mut out = String::new();
    out.push_str(&format!("execution_id: {}\n", outcome.execution_id));
    out.push_str(&format!("job_id: {}\n", outcome.job_id));
    out.push_str(&format!("command: {}\n", outcome.command));
    out.push_str(&format!(
        "start_time: {}\n",
        outcome.start_time.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    ));
    out.push_str(&format!(
        "end_time:   {}\n",
        outcome.end_time.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    ));
    let delta = outcome.end_time - outcome.start_time;
    let duration_seconds = delta
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or_else(|| delta.num_milliseconds() as f64 / 1_000.0);
    out.push_str(&format!("duration_seconds: {duration_seconds:.6}\n"));
    out.push_str(&format!("status: {}\n", outcome.status.as_str()));
    out.push_str(&format!("exit_code: {}\n", outcome.exit_code));
    out.push_str("stdout:\n");
    out.push_str(&outcome.stdout.data);
    if !outcome.stdout.data.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("stderr:\n");
    out.push_str(&outcome.stderr.data);
    if !outcome.stderr.data.ends_with('\n') {
        out.push('\n');
    }
    out
}
