//! Schedule Strategy.
//!
//! Classifies a job's `schedule` string as either a one-time ISO 8601
//! instant or a recurring five-field cron expression, and computes "next
//! fire time" for each kind.

use chrono::{DateTime, Duration, Utc};
use cron::Schedule as CronSchedule;
use std::fmt;
use std::str::FromStr;

/// How far behind `next_fire_time` may fall before a recurring entry
/// catches up by jumping to the next instant after "now".
pub const CATCHUP_WINDOW: Duration = Duration::minutes(1);

/// Classification failed against both candidate kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleError {
    pub schedule: String,
    pub iso8601_reason: String,
    pub cron_reason: String,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "schedule {:?} is neither a valid ISO 8601 instant ({}) nor a valid cron expression ({})",
            self.schedule, self.iso8601_reason, self.cron_reason
        )
    }
}

impl std::error::Error for ScheduleError {}

/// A classified schedule: either a one-time instant or a recurring cron.
#[derive(Debug, Clone)]
pub enum ScheduleStrategy {
    /// Fires exactly once at `instant`, then the entry is removed.
    OneTime { instant: DateTime<Utc> },
    /// Fires on every cron-matching instant, recomputed after each firing.
    Recurring {
        expression: String,
        schedule: CronSchedule,
    },
}

impl ScheduleStrategy {
    /// Classifies a schedule string. ISO 8601 is attempted first; cron
    /// tokens always contain whitespace, which ISO 8601 parsing rejects,
    /// so the two kinds never collide.
    pub fn classify(raw: &str) -> Result<Self, ScheduleError> {
        let iso_err = match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => return Ok(Self::OneTime {
                instant: parsed.with_timezone(&Utc),
            }),
            Err(e) => e.to_string(),
        };

        // `cron` expects 6 or 7 fields (with seconds); job files use the
        // common 5-field form, so prepend a "0" seconds field before
        // handing it to the crate.
        let six_field = format!("0 {raw}");
        match CronSchedule::from_str(&six_field) {
            Ok(schedule) => Ok(Self::Recurring {
                expression: raw.to_string(),
                schedule,
            }),
            Err(cron_err) => Err(ScheduleError {
                schedule: raw.to_string(),
                iso8601_reason: iso_err,
                cron_reason: cron_err.to_string(),
            }),
        }
    }

    /// The first fire time for a freshly-loaded entry.
    ///
    /// For `OneTime`, this is the parsed instant itself, even if it is
    /// already in the past — the caller decides whether that means
    /// `SKIPPED_PAST_DUE`. For `Recurring`, it's the earliest cron match
    /// strictly after `now`.
    #[must_use]
    pub fn initial_fire_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::OneTime { instant } => *instant,
            Self::Recurring { schedule, .. } => next_match_after(schedule, now),
        }
    }

    /// Whether a freshly-loaded `OneTime` entry's instant has already
    /// passed.
    #[must_use]
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::OneTime { instant } if *instant < now)
    }

    /// Computes the next `next_fire_time` after a firing at
    /// `prior_fire_time`, returning whether a catch-up jump was needed.
    ///
    /// Only meaningful for `Recurring`; `OneTime` entries are removed
    /// after their single firing and never call this.
    #[must_use]
    pub fn advance(&self, prior_fire_time: DateTime<Utc>, now: DateTime<Utc>) -> Advance {
        match self {
            Self::OneTime { .. } => Advance {
                next_fire_time: prior_fire_time,
                caught_up: false,
            },
            Self::Recurring { schedule, .. } => {
                let naive_next = next_match_after(schedule, prior_fire_time);
                if naive_next < now - CATCHUP_WINDOW {
                    Advance {
                        next_fire_time: next_match_after(schedule, now),
                        caught_up: true,
                    }
                } else {
                    Advance {
                        next_fire_time: naive_next,
                        caught_up: false,
                    }
                }
            }
        }
    }

    /// The original schedule string, for diagnostics and the
    /// `SCHEDULE_CHANGE` event.
    #[must_use]
    pub fn expression(&self) -> String {
        match self {
            Self::OneTime { instant } => instant.to_rfc3339(),
            Self::Recurring { expression, .. } => expression.clone(),
        }
    }
}

/// Result of recomputing `next_fire_time` for a recurring entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub next_fire_time: DateTime<Utc>,
    pub caught_up: bool,
}

fn next_match_after(schedule: &CronSchedule, after: DateTime<Utc>) -> DateTime<Utc> {
    schedule
        .after(&after)
        .next()
        .expect("a cron schedule always has an instant after any given time")
}
