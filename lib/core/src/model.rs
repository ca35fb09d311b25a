//! Data model types shared by the scheduler, executor, and observer seams.
//!
//! These are pure data: the types that cross crate boundaries so that
//! `chronoflow-scheduler` and `chronoflow-executor` can each depend on
//! `chronoflow-core` without depending on each other.

use crate::id::{ExecutionId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A schedule-lifecycle event.
///
/// `Display`'d in the `[<ts>] <EVENT> job_id=<id> key=value...` line
/// format the Event Logger writes to `scheduler.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleEvent {
    /// A new entry was created for a job that had no prior entry.
    Add { job_id: JobId },
    /// The task descriptor changed for an existing entry.
    Update { job_id: JobId },
    /// An entry was removed (file deleted, or `remove` called directly).
    Delete { job_id: JobId },
    /// The schedule string changed for an existing entry.
    ScheduleChange {
        job_id: JobId,
        old_schedule: String,
        new_schedule: String,
    },
    /// `add` was called with a definition identical to the current entry.
    Unchanged { job_id: JobId },
    /// The schedule string failed classification as either cron or ISO 8601.
    InvalidSchedule { job_id: JobId, reason: String },
    /// A one-time entry's instant was already in the past at load time.
    SkippedPastDue { job_id: JobId },
    /// A recurring entry's `next_fire_time` fell too far behind and was
    /// fast-forwarded to the next instant after "now".
    ScheduleCatchup { job_id: JobId },
    /// A due firing was dropped because the concurrency gate was full.
    ConcurrencyShed { job_id: JobId },
    /// The dispatch loop started.
    Start,
    /// The dispatch loop was asked to stop.
    Stop,
    /// A non-fatal error occurred while handling one job.
    Error {
        job_id: Option<JobId>,
        where_: String,
        reason: String,
    },
    /// The same error recurred too many times in a short window; the core
    /// is requesting shutdown.
    Fatal { reason: String },
}

impl ScheduleEvent {
    /// The bare event name, as it appears in the log line and in
    /// `tracing` fields.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "ADD",
            Self::Update { .. } => "UPDATE",
            Self::Delete { .. } => "DELETE",
            Self::ScheduleChange { .. } => "SCHEDULE_CHANGE",
            Self::Unchanged { .. } => "UNCHANGED",
            Self::InvalidSchedule { .. } => "INVALID_SCHEDULE",
            Self::SkippedPastDue { .. } => "SKIPPED_PAST_DUE",
            Self::ScheduleCatchup { .. } => "SCHEDULE_CATCHUP",
            Self::ConcurrencyShed { .. } => "CONCURRENCY_SHED",
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Error { .. } => "ERROR",
            Self::Fatal { .. } => "FATAL",
        }
    }

    /// The `job_id` this event pertains to, if any.
    #[must_use]
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Add { job_id }
            | Self::Update { job_id }
            | Self::Delete { job_id }
            | Self::ScheduleChange { job_id, .. }
            | Self::Unchanged { job_id }
            | Self::InvalidSchedule { job_id, .. }
            | Self::SkippedPastDue { job_id }
            | Self::ScheduleCatchup { job_id }
            | Self::ConcurrencyShed { job_id } => Some(job_id),
            Self::Error { job_id, .. } => job_id.as_ref(),
            Self::Start | Self::Stop | Self::Fatal { .. } => None,
        }
    }

    /// Extra `key=value` pairs to append after `job_id=` in the log line.
    #[must_use]
    pub fn extra_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::ScheduleChange {
                old_schedule,
                new_schedule,
                ..
            } => vec![
                ("old_schedule", format!("{old_schedule:?}")),
                ("new_schedule", format!("{new_schedule:?}")),
            ],
            Self::InvalidSchedule { reason, .. } => vec![("reason", format!("{reason:?}"))],
            Self::Error { where_, reason, .. } => vec![
                ("where", format!("{where_:?}")),
                ("reason", format!("{reason:?}")),
            ],
            Self::Fatal { reason } => vec![("reason", format!("{reason:?}"))],
            _ => Vec::new(),
        }
    }
}

/// Terminal status of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    Failure,
}

impl ExecutionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

/// Exit code sentinel for a subprocess that could not be spawned at all.
pub const EXIT_CODE_SPAWN_FAILURE: i32 = -1;
/// Exit code sentinel for a subprocess killed after exceeding its timeout.
pub const EXIT_CODE_TIMEOUT: i32 = -2;

/// Maximum bytes of stdout/stderr retained per execution before truncation.
pub const MAX_CAPTURED_STREAM_BYTES: usize = 1024 * 1024;

/// The immutable artifact produced by one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub job_id: JobId,
    /// 0-indexed; 0 is the first try, incrementing for retries.
    pub attempt: u32,
    pub command: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub exit_code: i32,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
}

impl ExecutionRecord {
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        let delta = self.end_time - self.start_time;
        match delta.num_microseconds() {
            Some(micros) => micros as f64 / 1_000_000.0,
            None => delta.num_milliseconds() as f64 / 1_000.0,
        }
    }
}

/// A captured output stream, bounded to [`MAX_CAPTURED_STREAM_BYTES`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedStream {
    pub data: String,
    /// Number of bytes dropped because the stream exceeded the cap.
    pub truncated_bytes: usize,
}

impl CapturedStream {
    #[must_use]
    pub fn new(data: String, truncated_bytes: usize) -> Self {
        Self {
            data,
            truncated_bytes,
        }
    }

    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated_bytes > 0
    }
}
