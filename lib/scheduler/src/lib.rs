//! Directory-driven job scheduling core.
//!
//! This crate provides:
//!
//! - **Job Definition Parser** ([`job`]): validates and loads job files
//! - **Schedule Strategy** ([`schedule`]): cron/one-time classification and
//!   next-fire-time computation, with catch-up semantics
//! - **Scheduled Entry** ([`entry`]): the in-memory scheduled form of a job
//! - **Event Logger** ([`event_log`]): the `scheduler.log` lifecycle stream
//! - **Scheduler Core** ([`core`]): the entry map, dispatch loop, and
//!   concurrency gate

pub mod core;
pub mod entry;
pub mod event_log;
pub mod job;
pub mod schedule;

pub use crate::core::{ClosedError, JobRunner, SchedulerCore, SchedulerCoreConfig};
pub use entry::ScheduledEntry;
pub use event_log::{EventLogError, EventLogger};
pub use job::{JobDefinition, TaskDescriptor, ValidationError};
pub use schedule::{Advance, ScheduleError, ScheduleStrategy, CATCHUP_WINDOW};
