//! Observer seam: external sinks invoked at well-defined lifecycle
//! points. The core has no hard dependency on any concrete metrics or
//! persistence backend; a fan-out adapter lets several observers share one
//! slot without one's failure affecting the others.

use crate::id::{ExecutionId, JobId};
use crate::model::{ExecutionRecord, ScheduleEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Invoked by the Scheduler Core and execution subsystem at lifecycle
/// points. All methods have no-op default bodies so implementors only
/// override what they care about.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Called for every schedule-lifecycle event, in addition to the
    /// on-disk event log.
    fn on_event(&self, _event: &ScheduleEvent) {}

    /// Called when an execution attempt begins.
    async fn on_execution_started(
        &self,
        _execution_id: ExecutionId,
        _job_id: &JobId,
        _start_time: DateTime<Utc>,
    ) {
    }

    /// Called when an execution attempt completes, successfully or not.
    async fn on_execution_finished(&self, _record: &ExecutionRecord) {}
}

/// An observer that does nothing. The default when no external sink is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl Observer for NoopObserver {}

/// Fans a call out to every registered observer. An observer's failure is
/// not expected to panic; this adapter has no recovery path for one that
/// does, by design, since `Observer` methods do not return a `Result`.
#[derive(Default)]
pub struct FanOutObserver {
    observers: Vec<Box<dyn Observer>>,
}

impl FanOutObserver {
    #[must_use]
    pub fn new(observers: Vec<Box<dyn Observer>>) -> Self {
        Self { observers }
    }
}

#[async_trait]
impl Observer for FanOutObserver {
    fn on_event(&self, event: &ScheduleEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }

    async fn on_execution_started(
        &self,
        execution_id: ExecutionId,
        job_id: &JobId,
        start_time: DateTime<Utc>,
    ) {
        for observer in &self.observers {
            observer
                .on_execution_started(execution_id, job_id, start_time)
                .await;
        }
    }

    async fn on_execution_finished(&self, record: &ExecutionRecord) {
        for observer in &self.observers {
            observer.on_execution_finished(record).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_observer_accepts_all_calls() {
        let observer = NoopObserver;
        observer.on_event(&ScheduleEvent::Start);
        observer
            .on_execution_started(ExecutionId::new(), &JobId::new("x").unwrap(), Utc::now())
            .await;
    }

    struct CountingObserver(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait]
    impl Observer for CountingObserver {
        fn on_event(&self, _event: &ScheduleEvent) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn fan_out_invokes_every_observer() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let a = CountingObserver(counter.clone());
        let b = CountingObserver(counter.clone());
        let fan_out = FanOutObserver::new(vec![Box::new(a), Box::new(b)]);
        fan_out.on_event(&ScheduleEvent::Start);
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
