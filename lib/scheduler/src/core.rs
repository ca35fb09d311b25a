//! Scheduler Core: owns the entry map, the dispatch loop, and the
//! concurrency gate.

use crate::entry::ScheduledEntry;
use crate::event_log::EventLogger;
use crate::job::JobDefinition;
use crate::schedule::ScheduleStrategy;
use async_trait::async_trait;
use chronoflow_core::{ExecutionId, JobId, Observer, ScheduleEvent};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;

/// Hands a due firing off to the execution subsystem.
///
/// Implemented by `chronoflow-executor`, kept as a trait here so this
/// crate never depends on the executor crate. The scheduler's job ends at
/// "start running this"; attempts, retries, and execution records are the
/// runner's business.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: JobDefinition, execution_id: ExecutionId);

    /// Cancels any outstanding retry backoff for `job_id`. A no-op if
    /// nothing for that id is pending. Does not affect an attempt already
    /// running; only the wait before its next retry is interruptible.
    async fn cancel(&self, _job_id: &JobId) {}
}

/// Returned by `add`/`remove` once [`SchedulerCore::stop`] has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedError;

impl fmt::Display for ClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduler core is stopped and rejects new mutations")
    }
}

impl std::error::Error for ClosedError {}

/// How many times the same `(where, reason)` error pair may recur inside
/// [`ERROR_ESCALATION_WINDOW`] before the core escalates to `FATAL` and
/// requests its own shutdown.
const ERROR_ESCALATION_THRESHOLD: usize = 5;
const ERROR_ESCALATION_WINDOW: Duration = Duration::from_secs(60);

struct State {
    entries: HashMap<JobId, ScheduledEntry>,
}

/// Tunables the Config Loader assembles and hands to the core at startup.
#[derive(Debug, Clone)]
pub struct SchedulerCoreConfig {
    pub tick_interval: Duration,
    pub max_concurrent_jobs: usize,
    pub shutdown_grace_period: Duration,
}

/// Tracks recent `(where, reason)` error occurrences for escalation.
struct ErrorWindow {
    seen: Vec<(std::time::Instant, String)>,
}

impl ErrorWindow {
    fn new() -> Self {
        Self { seen: Vec::new() }
    }

    /// Records one occurrence and returns whether the threshold within
    /// the window has now been exceeded.
    fn record(&mut self, key: &str) -> bool {
        let now = std::time::Instant::now();
        self.seen
            .retain(|(at, _)| now.duration_since(*at) <= ERROR_ESCALATION_WINDOW);
        self.seen.push((now, key.to_string()));
        self.seen.iter().filter(|(_, k)| k == key).count() >= ERROR_ESCALATION_THRESHOLD
    }
}

/// Owns the schedule table, the dispatch loop, and the concurrency gate.
pub struct SchedulerCore {
    state: Mutex<State>,
    error_window: Mutex<ErrorWindow>,
    events: Arc<EventLogger>,
    observer: Arc<dyn Observer>,
    runner: Arc<dyn JobRunner>,
    gate: Arc<Semaphore>,
    config: SchedulerCoreConfig,
    closed: AtomicBool,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: Notify,
}

impl SchedulerCore {
    #[must_use]
    pub fn new(
        events: Arc<EventLogger>,
        observer: Arc<dyn Observer>,
        runner: Arc<dyn JobRunner>,
        config: SchedulerCoreConfig,
    ) -> Arc<Self> {
        let gate = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Arc::new(Self {
            state: Mutex::new(State {
                entries: HashMap::new(),
            }),
            error_window: Mutex::new(ErrorWindow::new()),
            events,
            observer,
            runner,
            gate,
            config,
            closed: AtomicBool::new(false),
            dispatch_handle: Mutex::new(None),
            shutdown: Notify::new(),
        })
    }

    fn publish(&self, event: ScheduleEvent) {
        self.events.record(&event);
        self.observer.on_event(&event);
    }

    fn ensure_open(&self) -> Result<(), ClosedError> {
        if self.closed.load(Ordering::Acquire) {
            Err(ClosedError)
        } else {
            Ok(())
        }
    }

    /// Inserts or replaces the entry for `job.job_id` per the replacement
    /// rules: no-op + `UNCHANGED`, `SCHEDULE_CHANGE`, `UPDATE`, or
    /// `ADD`, and `INVALID_SCHEDULE` with the prior entry left intact if
    /// the new schedule string fails classification.
    pub async fn add(&self, job: JobDefinition) -> Result<(), ClosedError> {
        self.ensure_open()?;
        let now = Utc::now();

        let strategy = match ScheduleStrategy::classify(&job.schedule) {
            Ok(strategy) => strategy,
            Err(e) => {
                self.publish(ScheduleEvent::InvalidSchedule {
                    job_id: job.job_id.clone(),
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };

        enum Outcome {
            Added { job_id: JobId, past_due: bool },
            Unchanged { job_id: JobId },
            ScheduleChanged { job_id: JobId, old: String, new: String },
            Updated { job_id: JobId },
        }

        let outcome = {
            let mut state = self.state.lock().await;
            match state.entries.get(&job.job_id) {
                None => {
                    let past_due = strategy.is_past_due(now);
                    let job_id = job.job_id.clone();
                    state
                        .entries
                        .insert(job_id.clone(), ScheduledEntry::new(job, strategy, now));
                    Outcome::Added { job_id, past_due }
                }
                Some(existing) => {
                    let schedule_changed = existing.job.schedule != job.schedule;
                    let task_changed = existing.job.task != job.task;
                    if !schedule_changed && !task_changed {
                        Outcome::Unchanged {
                            job_id: job.job_id.clone(),
                        }
                    } else {
                        let old_schedule = existing.job.schedule.clone();
                        let job_id = job.job_id.clone();
                        let new_schedule = job.schedule.clone();
                        state
                            .entries
                            .get_mut(&job_id)
                            .expect("entry presence just checked")
                            .replace(job, strategy, now);
                        if schedule_changed {
                            Outcome::ScheduleChanged {
                                job_id,
                                old: old_schedule,
                                new: new_schedule,
                            }
                        } else {
                            Outcome::Updated { job_id }
                        }
                    }
                }
            }
        };

        match outcome {
            Outcome::Added { job_id, past_due } => {
                self.publish(ScheduleEvent::Add {
                    job_id: job_id.clone(),
                });
                if past_due {
                    self.publish(ScheduleEvent::SkippedPastDue {
                        job_id: job_id.clone(),
                    });
                    self.state.lock().await.entries.remove(&job_id);
                }
            }
            Outcome::Unchanged { job_id } => self.publish(ScheduleEvent::Unchanged { job_id }),
            Outcome::ScheduleChanged { job_id, old, new } => {
                self.publish(ScheduleEvent::ScheduleChange {
                    job_id,
                    old_schedule: old,
                    new_schedule: new,
                });
            }
            Outcome::Updated { job_id } => self.publish(ScheduleEvent::Update { job_id }),
        }

        Ok(())
    }

    /// Removes the entry for `job_id`, if present, and emits `DELETE`.
    /// An attempt already running is unaffected, but any retry of that
    /// job_id still waiting out its backoff is cancelled.
    pub async fn remove(&self, job_id: &JobId) -> Result<(), ClosedError> {
        self.ensure_open()?;
        let removed = self.state.lock().await.entries.remove(job_id).is_some();
        if removed {
            self.publish(ScheduleEvent::Delete {
                job_id: job_id.clone(),
            });
        }
        self.runner.cancel(job_id).await;
        Ok(())
    }

    /// Reports a non-fatal error on behalf of another component (e.g. the
    /// Directory Reconciler's per-file parse failures). Tracks
    /// recurrence and escalates to `FATAL` + self-initiated `stop` if the
    /// same `(where, reason)` pair recurs too often in a short window.
    pub async fn report_error(&self, job_id: Option<JobId>, where_: impl Into<String>, reason: impl Into<String>) {
        let where_ = where_.into();
        let reason = reason.into();
        self.publish(ScheduleEvent::Error {
            job_id,
            where_: where_.clone(),
            reason: reason.clone(),
        });

        let key = format!("{where_}:{reason}");
        let escalate = self.error_window.lock().await.record(&key);
        if escalate {
            self.publish(ScheduleEvent::Fatal {
                reason: format!("{where_}: {reason} recurred {ERROR_ESCALATION_THRESHOLD}+ times within 60s"),
            });
            self.closed.store(true, Ordering::Release);
            self.shutdown.notify_waiters();
        }
    }

    /// Spawns the dispatch loop. Idempotent while already running.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut handle = self.dispatch_handle.lock().await;
            if handle.is_some() {
                return;
            }
            let this = Arc::clone(self);
            *handle = Some(tokio::spawn(async move { this.dispatch_loop().await }));
        }
        self.publish(ScheduleEvent::Start);
    }

    /// Signals the dispatch loop to drain, waits up to the configured
    /// grace period for it to finish its current pass, then closes the
    /// core against further mutation.
    pub async fn stop(self: &Arc<Self>) {
        self.shutdown.notify_waiters();
        let handle = self.dispatch_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(self.config.shutdown_grace_period, handle).await;
        }
        self.closed.store(true, Ordering::Release);
        self.publish(ScheduleEvent::Stop);
    }

    async fn dispatch_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.shutdown.notified() => break,
            }
            self.dispatch_once().await;
        }
    }

    /// One dispatch pass: snapshot due entries under the lock, advance or
    /// remove them, release the lock, then admit each due firing through
    /// the concurrency gate. Never holds the lock across I/O or subprocess
    /// spawn.
    async fn dispatch_once(&self) {
        let now = Utc::now();
        let mut due_jobs = Vec::new();
        let mut catchup_job_ids = Vec::new();

        {
            let mut state = self.state.lock().await;
            let mut terminal = Vec::new();
            for (job_id, entry) in state.entries.iter_mut() {
                if !entry.is_due(now) {
                    continue;
                }
                due_jobs.push(entry.job.clone());
                if entry.is_one_time() {
                    terminal.push(job_id.clone());
                } else if entry.advance(now) {
                    catchup_job_ids.push(job_id.clone());
                }
            }
            for job_id in terminal {
                state.entries.remove(&job_id);
            }
        }

        for job_id in catchup_job_ids {
            self.publish(ScheduleEvent::ScheduleCatchup { job_id });
        }

        for job in due_jobs {
            self.dispatch_one(job).await;
        }
    }

    async fn dispatch_one(&self, job: JobDefinition) {
        match Arc::clone(&self.gate).try_acquire_owned() {
            Ok(permit) => {
                let execution_id = ExecutionId::new();
                let runner = Arc::clone(&self.runner);
                tokio::spawn(async move {
                    let _permit = permit;
                    runner.run(job, execution_id).await;
                });
            }
            Err(_) => {
                self.publish(ScheduleEvent::ConcurrencyShed {
                    job_id: job.job_id,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TaskDescriptor;
    use chronoflow_core::NoopObserver;
    use std::sync::atomic::AtomicUsize;

    fn job(id: &str, schedule: &str) -> JobDefinition {
        JobDefinition {
            job_id: JobId::new(id).unwrap(),
            description: None,
            schedule: schedule.to_string(),
            task: TaskDescriptor::ExecuteCommand {
                command: "true".to_string(),
            },
        }
    }

    struct CountingRunner(Arc<AtomicUsize>);

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run(&self, _job: JobDefinition, _execution_id: ExecutionId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_core(max_concurrent_jobs: usize) -> (Arc<SchedulerCore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventLogger::open(dir.path()).unwrap());
        let core = SchedulerCore::new(
            events,
            Arc::new(NoopObserver),
            Arc::new(CountingRunner(Arc::new(AtomicUsize::new(0)))),
            SchedulerCoreConfig {
                tick_interval: Duration::from_millis(10),
                max_concurrent_jobs,
                shutdown_grace_period: Duration::from_secs(1),
            },
        );
        (core, dir)
    }

    #[tokio::test]
    async fn add_new_job_is_add_event() {
        let (core, _dir) = test_core(4);
        core.add(job("x", "* * * * *")).await.unwrap();
        let state = core.state.lock().await;
        assert!(state.entries.contains_key(&JobId::new("x").unwrap()));
    }

    #[tokio::test]
    async fn add_identical_definition_twice_is_idempotent() {
        let (core, _dir) = test_core(4);
        core.add(job("x", "* * * * *")).await.unwrap();
        core.add(job("x", "* * * * *")).await.unwrap();
        let state = core.state.lock().await;
        assert_eq!(state.entries.len(), 1);
    }

    #[tokio::test]
    async fn add_with_changed_schedule_updates_entry() {
        let (core, _dir) = test_core(4);
        core.add(job("x", "0 * * * *")).await.unwrap();
        core.add(job("x", "*/5 * * * *")).await.unwrap();
        let state = core.state.lock().await;
        let entry = &state.entries[&JobId::new("x").unwrap()];
        assert_eq!(entry.generation, 1);
    }

    #[tokio::test]
    async fn invalid_schedule_preserves_prior_entry() {
        let (core, _dir) = test_core(4);
        core.add(job("x", "0 * * * *")).await.unwrap();
        core.add(job("x", "not a schedule")).await.unwrap();
        let state = core.state.lock().await;
        let entry = &state.entries[&JobId::new("x").unwrap()];
        assert_eq!(entry.job.schedule, "0 * * * *");
    }

    #[tokio::test]
    async fn remove_deletes_entry() {
        let (core, _dir) = test_core(4);
        core.add(job("x", "* * * * *")).await.unwrap();
        core.remove(&JobId::new("x").unwrap()).await.unwrap();
        let state = core.state.lock().await;
        assert!(state.entries.is_empty());
    }

    #[tokio::test]
    async fn stop_then_add_is_rejected() {
        let (core, _dir) = test_core(4);
        core.start().await;
        core.stop().await;
        let err = core.add(job("x", "* * * * *")).await.unwrap_err();
        assert_eq!(err, ClosedError);
    }

    #[tokio::test]
    async fn one_time_past_due_entry_is_removed_without_firing() {
        let (core, _dir) = test_core(4);
        core.add(job("x", "2000-01-01T00:00:00Z")).await.unwrap();
        let state = core.state.lock().await;
        assert!(state.entries.is_empty());
    }

    #[tokio::test]
    async fn concurrency_gate_sheds_past_capacity() {
        let (core, _dir) = test_core(1);
        // Exhaust the single permit manually to force a shed on dispatch.
        let _permit = Arc::clone(&core.gate).try_acquire_owned().unwrap();
        core.dispatch_one(job("a", "* * * * *")).await;
        // No panic, no permit leaked beyond the one held above.
        assert_eq!(core.gate.available_permits(), 0);
    }

    #[tokio::test]
    async fn repeated_error_escalates_to_fatal_and_closes() {
        let (core, _dir) = test_core(4);
        for _ in 0..ERROR_ESCALATION_THRESHOLD {
            core.report_error(None, "reconciler", "boom").await;
        }
        assert!(core.closed.load(Ordering::Acquire));
    }
}
