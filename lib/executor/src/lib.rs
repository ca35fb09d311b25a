//! Subprocess execution, retry/backoff, and execution-record logging.
//!
//! This crate implements `chronoflow_scheduler::JobRunner`: the Scheduler
//! Core hands it one due firing at a time, and it owns everything that
//! happens after that — attempts, backoff, the log file, and the observer
//! hooks for execution lifecycle points.

pub mod executor;
pub mod log_writer;
pub mod retry;

pub use executor::Outcome;
pub use log_writer::{LogWriteError, LogWriter};
pub use retry::{RetryHandle, RetryPolicy, RetryTracker};

use async_trait::async_trait;
use chronoflow_core::{ExecutionId, ExecutionRecord, JobId, Observer};
use chronoflow_scheduler::{JobDefinition, JobRunner};
use std::sync::Arc;

/// The `JobRunner` the Scheduler Core drives: runs a firing to completion,
/// including retries, writing a log file per attempt and notifying
/// observers.
pub struct ChronoflowJobRunner {
    policy: RetryPolicy,
    log_writer: Arc<LogWriter>,
    observer: Arc<dyn Observer>,
    retries: RetryTracker,
}

impl ChronoflowJobRunner {
    #[must_use]
    pub fn new(policy: RetryPolicy, log_writer: Arc<LogWriter>, observer: Arc<dyn Observer>) -> Self {
        Self {
            policy,
            log_writer,
            observer,
            retries: RetryTracker::new(),
        }
    }
}

#[async_trait]
impl JobRunner for ChronoflowJobRunner {
    async fn run(&self, job: JobDefinition, execution_id: ExecutionId) {
        let handle = self.retries.begin(&job.job_id).await;
        self.observer
            .on_execution_started(execution_id, &job.job_id, chrono::Utc::now())
            .await;

        retry::run_with_retries(&job, execution_id, &self.policy, &handle.token, |outcome| {
            if let Err(e) = self.log_writer.write(outcome) {
                tracing::warn!(error = %e, job_id = %outcome.job_id, "failed to write execution log");
            }
            let record = to_record(outcome);
            // `on_attempt` is sync; hand the async observer call off to a
            // detached task so a slow sink cannot stall the retry loop.
            let observer = Arc::clone(&self.observer);
            tokio::spawn(async move { observer.on_execution_finished(&record).await });
        })
        .await;

        self.retries.finish(&job.job_id, &handle).await;
    }

    async fn cancel(&self, job_id: &JobId) {
        self.retries.cancel(job_id).await;
    }
}

fn to_record(outcome: &Outcome) -> ExecutionRecord {
    ExecutionRecord {
        execution_id: outcome.execution_id,
        job_id: outcome.job_id.clone(),
        attempt: outcome.attempt,
        command: outcome.command.clone(),
        start_time: outcome.start_time,
        end_time: outcome.end_time,
        status: outcome.status,
        exit_code: outcome.exit_code,
        stdout: outcome.stdout.clone(),
        stderr: outcome.stderr.clone(),
    }
}
