//! Event Logger.
//!
//! Appends one line per [`ScheduleEvent`] to a `scheduler.log` stream and,
//! in parallel, emits the same event through `tracing` so it reaches
//! whatever subscriber the process is configured with.

use chronoflow_core::ScheduleEvent;
use chrono::Utc;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Failure to open or append to the on-disk event log.
#[derive(Debug)]
pub struct EventLogError {
    pub path: PathBuf,
    pub reason: io::Error,
}

impl fmt::Display for EventLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scheduler event log {}: {}",
            self.path.display(),
            self.reason
        )
    }
}

impl std::error::Error for EventLogError {}

/// Writes schedule-lifecycle events to `<log_dir>/scheduler.log`.
///
/// Each call to [`Self::record`] appends one line and flushes immediately,
/// so a crash mid-run loses at most the in-flight line, never a prior one.
pub struct EventLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl EventLogger {
    /// Opens (creating if necessary) `<log_dir>/scheduler.log` for append.
    pub fn open(log_dir: &Path) -> Result<Self, EventLogError> {
        std::fs::create_dir_all(log_dir).map_err(|e| EventLogError {
            path: log_dir.to_path_buf(),
            reason: e,
        })?;
        let path = log_dir.join("scheduler.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EventLogError {
                path: path.clone(),
                reason: e,
            })?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Records one event: appends its log line and emits a `tracing` event.
    pub fn record(&self, event: &ScheduleEvent) {
        self.emit_tracing(event);
        if let Err(e) = self.append_line(event) {
            tracing::warn!(error = %e, "failed to append to scheduler event log");
        }
    }

    fn append_line(&self, event: &ScheduleEvent) -> Result<(), EventLogError> {
        let line = format_line(event);
        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        file.write_all(line.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.flush())
            .map_err(|e| EventLogError {
                path: self.path.clone(),
                reason: e,
            })
    }

    fn emit_tracing(&self, event: &ScheduleEvent) {
        let name = event.name();
        let job_id = event.job_id().map(|id| id.to_string()).unwrap_or_default();
        match event {
            ScheduleEvent::Fatal { .. } => {
                tracing::error!(event = name, job_id = %job_id, fields = ?event.extra_fields(), "scheduler fatal event")
            }
            ScheduleEvent::Error { .. } => {
                tracing::warn!(event = name, job_id = %job_id, fields = ?event.extra_fields(), "scheduler error event")
            }
            _ => {
                tracing::info!(event = name, job_id = %job_id, fields = ?event.extra_fields(), "scheduler event")
            }
        }
    }
}

/// Formats one event as `[<ts>] <EVENT> job_id=<id>[ key=value]*`.
fn format_line(event: &ScheduleEvent) -> String {
    let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
    let job_id = event
        .job_id()
        .map(|id| format!("{id:?}"))
        .unwrap_or_else(|| "null".to_string());
    let mut line = format!("[{ts}] {} job_id={job_id}", event.name());
    for (key, value) in event.extra_fields() {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(&value);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronoflow_core::JobId;

    #[test]
    fn appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let logger = EventLogger::open(dir.path()).unwrap();
        logger.record(&ScheduleEvent::Add {
            job_id: JobId::new("nightly").unwrap(),
        });
        logger.record(&ScheduleEvent::Start);

        let contents = std::fs::read_to_string(dir.path().join("scheduler.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("ADD job_id=\"nightly\""));
        assert!(lines[1].contains("STOP") == false);
        assert!(lines[1].contains("START"));
    }

    #[test]
    fn schedule_change_line_carries_old_and_new() {
        let dir = tempfile::tempdir().unwrap();
        let logger = EventLogger::open(dir.path()).unwrap();
        logger.record(&ScheduleEvent::ScheduleChange {
            job_id: JobId::new("nightly").unwrap(),
            old_schedule: "0 * * * *".to_string(),
            new_schedule: "*/5 * * * *".to_string(),
        });
        let contents = std::fs::read_to_string(dir.path().join("scheduler.log")).unwrap();
        assert!(contents.contains("old_schedule=\"0 * * * *\""));
        assert!(contents.contains("new_schedule=\"*/5 * * * *\""));
    }

    #[test]
    fn creates_log_dir_if_missing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("logs");
        assert!(EventLogger::open(&nested).is_ok());
        assert!(nested.join("scheduler.log").exists());
    }
}
