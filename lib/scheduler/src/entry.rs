//! Scheduled Entry: the in-memory scheduled form of one job.

use crate::job::JobDefinition;
use crate::schedule::ScheduleStrategy;
use chrono::{DateTime, Utc};

/// One entry in the Scheduler Core's entry map.
pub struct ScheduledEntry {
    pub job: JobDefinition,
    pub strategy: ScheduleStrategy,
    pub next_fire_time: DateTime<Utc>,
    pub last_fire_start: Option<DateTime<Utc>>,
    /// Incremented every time this entry is replaced in place.
    pub generation: u64,
}

impl ScheduledEntry {
    /// Builds a freshly-loaded entry. Does not decide whether a past-due
    /// one-time instant should be skipped — the caller (Scheduler Core)
    /// does that, since it also needs to emit the `SKIPPED_PAST_DUE`
    /// event.
    #[must_use]
    pub fn new(job: JobDefinition, strategy: ScheduleStrategy, now: DateTime<Utc>) -> Self {
        let next_fire_time = strategy.initial_fire_time(now);
        Self {
            job,
            strategy,
            next_fire_time,
            last_fire_start: None,
            generation: 0,
        }
    }

    /// Whether this entry is due to fire.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire_time <= now
    }

    /// Whether this is a one-time entry (removed after its single firing).
    #[must_use]
    pub fn is_one_time(&self) -> bool {
        matches!(self.strategy, ScheduleStrategy::OneTime { .. })
    }

    /// Advances `next_fire_time` after a firing, returning whether a
    /// catch-up jump was applied. Only meaningful for recurring entries;
    /// one-time entries are removed by the caller instead.
    pub fn advance(&mut self, now: DateTime<Utc>) -> bool {
        let fired_at = self.next_fire_time;
        let advance = self.strategy.advance(fired_at, now);
        self.next_fire_time = advance.next_fire_time;
        advance.caught_up
    }

    /// Replaces this entry's job/strategy in place, bumping the
    /// generation counter.
    pub fn replace(&mut self, job: JobDefinition, strategy: ScheduleStrategy, now: DateTime<Utc>) {
        self.next_fire_time = strategy.initial_fire_time(now);
        self.job = job;
        self.strategy = strategy;
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TaskDescriptor;
    use chronoflow_core::JobId;

    fn job(id: &str) -> JobDefinition {
        JobDefinition {
            job_id: JobId::new(id).unwrap(),
            description: None,
            schedule: "* * * * *".to_string(),
            task: TaskDescriptor::ExecuteCommand {
                command: "true".to_string(),
            },
        }
    }

    #[test]
    fn new_entry_starts_at_generation_zero() {
        let now = Utc::now();
        let strategy = ScheduleStrategy::classify("* * * * *").unwrap();
        let entry = ScheduledEntry::new(job("x"), strategy, now);
        assert_eq!(entry.generation, 0);
        assert!(!entry.is_due(now));
    }

    #[test]
    fn replace_bumps_generation() {
        let now = Utc::now();
        let strategy = ScheduleStrategy::classify("* * * * *").unwrap();
        let mut entry = ScheduledEntry::new(job("x"), strategy.clone(), now);
        entry.replace(job("x"), strategy, now);
        assert_eq!(entry.generation, 1);
    }

    #[test]
    fn one_time_detected() {
        let now = Utc::now();
        let strategy = ScheduleStrategy::classify("2999-01-01T00:00:00Z").unwrap();
        let entry = ScheduledEntry::new(job("x"), strategy, now);
        assert!(entry.is_one_time());
    }
}
