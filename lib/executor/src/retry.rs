//! Retry Controller.
//!
//! Drives repeated attempts of one firing with exponential backoff, and
//! tracks the one pending retry per `job_id` so that a fresh firing of the
//! same job can cancel it ("real-time alignment over eventual
//! consistency").

use crate::executor::{self, Outcome};
use chronoflow_core::{ExecutionId, JobId};
use chronoflow_scheduler::JobDefinition;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// `max_retries` and `retry_delay_base_seconds` from the Runtime
/// Configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_base_seconds: u64,
    pub job_timeout: Duration,
}

impl RetryPolicy {
    /// Backoff delay before attempt `k` (0-indexed) is retried, i.e. the
    /// wait after attempt `k` fails: `base * 2^k`.
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.retry_delay_base_seconds.saturating_mul(1 << attempt))
    }
}

/// Tracks the single outstanding retry sequence per `job_id`, so a new
/// firing can cancel the previous one before starting its own.
#[derive(Default)]
pub struct RetryTracker {
    pending: Mutex<HashMap<JobId, (u64, CancellationToken)>>,
    next_id: AtomicU64,
}

/// Handle returned by [`RetryTracker::begin`]; pass back to [`RetryTracker::finish`]
/// once the sequence it guards has ended.
pub struct RetryHandle {
    id: u64,
    pub token: CancellationToken,
}

impl RetryTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any retry sequence in flight for `job_id` and registers a
    /// fresh cancellation token for the new one.
    pub async fn begin(&self, job_id: &JobId) -> RetryHandle {
        let mut pending = self.pending.lock().await;
        if let Some((_, previous)) = pending.remove(job_id) {
            previous.cancel();
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        pending.insert(job_id.clone(), (id, token.clone()));
        RetryHandle { id, token }
    }

    /// Clears the tracked entry for `job_id` if it is still the one this
    /// handle was issued for (a newer firing may have already replaced it).
    pub async fn finish(&self, job_id: &JobId, handle: &RetryHandle) {
        let mut pending = self.pending.lock().await;
        if pending.get(job_id).is_some_and(|(id, _)| *id == handle.id) {
            pending.remove(job_id);
        }
    }

    /// Cancels the retry sequence tracked for `job_id`, if any, without
    /// removing the entry — `finish` still owns cleanup once the cancelled
    /// sequence's `run_with_retries` loop observes the token and returns.
    /// A no-op if nothing is pending for `job_id`.
    pub async fn cancel(&self, job_id: &JobId) {
        let pending = self.pending.lock().await;
        if let Some((_, token)) = pending.get(job_id) {
            token.cancel();
        }
    }
}

/// Runs attempts 0..=`policy.max_retries` of `job`, stopping early on
/// success, on exhausting retries, or on `cancel` firing (a newer
/// scheduled firing of the same job superseded this one). Invokes
/// `on_attempt` with each attempt's outcome as it completes.
pub async fn run_with_retries(
    job: &JobDefinition,
    execution_id: ExecutionId,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut on_attempt: impl FnMut(&Outcome),
) {
    let mut attempt = 0u32;
    loop {
        // Cancellation only ever supersedes a *retry*, never an attempt
        // already running: the core allows same-job firings to overlap, so
        // the one in flight here runs to completion regardless of what a
        // newer firing does to this job's tracked token.
        let outcome = executor::execute(job, execution_id, attempt, policy.job_timeout).await;
        let is_success = outcome.status == chronoflow_core::ExecutionStatus::Success;
        on_attempt(&outcome);

        if is_success || attempt >= policy.max_retries {
            return;
        }

        let delay = policy.backoff_after(attempt);
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => return,
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            retry_delay_base_seconds: 1,
            job_timeout: Duration::from_secs(5),
        };
        assert_eq!(policy.backoff_after(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn begin_cancels_previous_token_for_same_job() {
        let tracker = RetryTracker::new();
        let job_id = JobId::new("x").unwrap();
        let first = tracker.begin(&job_id).await;
        let _second = tracker.begin(&job_id).await;
        assert!(first.token.is_cancelled());
    }

    #[tokio::test]
    async fn finish_does_not_remove_a_newer_handle() {
        let tracker = RetryTracker::new();
        let job_id = JobId::new("x").unwrap();
        let first = tracker.begin(&job_id).await;
        let _second = tracker.begin(&job_id).await;
        tracker.finish(&job_id, &first).await;
        assert!(tracker.pending.lock().await.contains_key(&job_id));
    }

    #[tokio::test]
    async fn cancel_marks_pending_token_without_removing_entry() {
        let tracker = RetryTracker::new();
        let job_id = JobId::new("x").unwrap();
        let handle = tracker.begin(&job_id).await;
        tracker.cancel(&job_id).await;
        assert!(handle.token.is_cancelled());
        assert!(tracker.pending.lock().await.contains_key(&job_id));
    }

    #[tokio::test]
    async fn cancel_of_unknown_job_id_is_a_no_op() {
        let tracker = RetryTracker::new();
        tracker.cancel(&JobId::new("unknown").unwrap()).await;
    }

    #[tokio::test]
    async fn cancelling_token_mid_first_attempt_does_not_suppress_its_outcome() {
        use chronoflow_scheduler::TaskDescriptor;
        let job = JobDefinition {
            job_id: JobId::new("x").unwrap(),
            description: None,
            schedule: "* * * * *".to_string(),
            task: TaskDescriptor::ExecuteCommand {
                command: "exit 1".to_string(),
            },
        };
        let policy = RetryPolicy {
            max_retries: 1,
            retry_delay_base_seconds: 5,
            job_timeout: Duration::from_secs(5),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let attempts_clone = attempts.clone();
        run_with_retries(&job, ExecutionId::new(), &policy, &cancel, move |outcome| {
            attempts_clone.try_lock().unwrap().push(outcome.attempt);
        })
        .await;
        // The first attempt still ran and was recorded even though the
        // token was already cancelled; only the subsequent retry's backoff
        // wait was short-circuited.
        assert_eq!(*attempts.lock().await, vec![0]);
    }

    #[tokio::test]
    async fn retries_exhaust_after_max_retries() {
        use chronoflow_scheduler::TaskDescriptor;
        let job = JobDefinition {
            job_id: JobId::new("x").unwrap(),
            description: None,
            schedule: "* * * * *".to_string(),
            task: TaskDescriptor::ExecuteCommand {
                command: "exit 1".to_string(),
            },
        };
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay_base_seconds: 0,
            job_timeout: Duration::from_secs(5),
        };
        let cancel = CancellationToken::new();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let attempts_clone = attempts.clone();
        run_with_retries(&job, ExecutionId::new(), &policy, &cancel, move |outcome| {
            attempts_clone.try_lock().unwrap().push(outcome.attempt);
        })
        .await;
        assert_eq!(*attempts.lock().await, vec![0, 1, 2]);
    }
}
