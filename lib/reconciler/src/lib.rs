//! Directory Reconciler.
//!
//! Polls the jobs directory at a fixed interval and translates file
//! mutations into `add`/`remove` calls on a [`SchedulerCore`]. Owns the
//! file-state map exclusively; no locking is needed across reconciliation
//! ticks because only this loop ever touches it.

use chronoflow_core::JobId;
use chronoflow_scheduler::{JobDefinition, SchedulerCore};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Tunables for one reconciler instance.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub jobs_dir: PathBuf,
    pub poll_interval: Duration,
}

struct FileState {
    mtime: SystemTime,
    job_id: JobId,
}

/// Observes `config.jobs_dir` and keeps `core`'s entry map synchronized
/// with the `*.json` files it contains.
pub struct DirectoryReconciler {
    config: ReconcilerConfig,
    core: Arc<SchedulerCore>,
    state: Mutex<HashMap<PathBuf, FileState>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: Notify,
}

impl DirectoryReconciler {
    #[must_use]
    pub fn new(config: ReconcilerConfig, core: Arc<SchedulerCore>) -> Arc<Self> {
        Arc::new(Self {
            config,
            core,
            state: Mutex::new(HashMap::new()),
            handle: Mutex::new(None),
            shutdown: Notify::new(),
        })
    }

    /// Spawns the polling loop. Idempotent while already running.
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { this.poll_loop().await }));
    }

    /// Signals the polling loop to stop and waits for its current tick to
    /// finish.
    pub async fn stop(self: &Arc<Self>) {
        self.shutdown.notify_waiters();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.shutdown.notified() => break,
            }
            self.tick().await;
        }
    }

    /// Runs one reconciliation pass. Public so tests and
    /// the CLI front-end can drive it deterministically without waiting on
    /// the poll interval.
    pub async fn tick(&self) {
        let current_paths = match scan(&self.config.jobs_dir) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(
                    jobs_dir = %self.config.jobs_dir.display(),
                    error = %e,
                    "failed to scan jobs directory"
                );
                self.core
                    .report_error(None, self.config.jobs_dir.display().to_string(), e.to_string())
                    .await;
                return;
            }
        };

        let mut state = self.state.lock().await;
        let mut seen = std::collections::HashSet::with_capacity(current_paths.len());

        for path in current_paths {
            seen.insert(path.clone());
            let mtime = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(mtime) => mtime,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read file metadata");
                    self.core
                        .report_error(None, path.display().to_string(), e.to_string())
                        .await;
                    continue;
                }
            };

            let is_new_or_changed = match state.get(&path) {
                None => true,
                Some(prev) => prev.mtime != mtime,
            };
            if !is_new_or_changed {
                continue;
            }

            match JobDefinition::load(&path) {
                Ok(job) => {
                    if let Some(prev) = state.get(&path) {
                        if prev.job_id != job.job_id {
                            let _ = self.core.remove(&prev.job_id).await;
                        }
                    }
                    let job_id = job.job_id.clone();
                    if self.core.add(job).await.is_ok() {
                        state.insert(path, FileState { mtime, job_id });
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to load job definition");
                    let prior_job_id = state.get(&path).map(|s| s.job_id.clone());
                    self.core
                        .report_error(prior_job_id, path.display().to_string(), e.to_string())
                        .await;
                }
            }
        }

        let removed_paths: Vec<PathBuf> = state
            .keys()
            .filter(|path| !seen.contains(*path))
            .cloned()
            .collect();
        for path in removed_paths {
            if let Some(entry) = state.remove(&path) {
                let _ = self.core.remove(&entry.job_id).await;
            }
        }
    }
}

/// Lists `*.json` files directly inside `dir` (non-recursive).
fn scan(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronoflow_core::NoopObserver;
    use chronoflow_scheduler::{EventLogger, SchedulerCoreConfig};
    use std::io::Write;

    async fn test_reconciler() -> (Arc<DirectoryReconciler>, tempfile::TempDir, tempfile::TempDir) {
        let jobs_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventLogger::open(log_dir.path()).unwrap());

        struct NullRunner;
        #[async_trait::async_trait]
        impl chronoflow_scheduler::JobRunner for NullRunner {
            async fn run(&self, _job: JobDefinition, _execution_id: chronoflow_core::ExecutionId) {}
        }

        let core = SchedulerCore::new(
            events,
            Arc::new(NoopObserver),
            Arc::new(NullRunner),
            SchedulerCoreConfig {
                tick_interval: Duration::from_millis(10),
                max_concurrent_jobs: 4,
                shutdown_grace_period: Duration::from_secs(1),
            },
        );
        let reconciler = DirectoryReconciler::new(
            ReconcilerConfig {
                jobs_dir: jobs_dir.path().to_path_buf(),
                poll_interval: Duration::from_millis(10),
            },
            core,
        );
        (reconciler, jobs_dir, log_dir)
    }

    fn write_job(dir: &Path, name: &str, job_id: &str, schedule: &str) {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"job_id": "{job_id}", "schedule": "{schedule}", "task": {{"type": "execute_command", "command": "true"}}}}"#
        )
        .unwrap();
    }

    #[tokio::test]
    async fn tick_adds_new_files() {
        let (reconciler, jobs_dir, _log_dir) = test_reconciler().await;
        write_job(jobs_dir.path(), "a.json", "job-a", "* * * * *");
        reconciler.tick().await;
        let state = reconciler.state.lock().await;
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn tick_removes_deleted_files() {
        let (reconciler, jobs_dir, _log_dir) = test_reconciler().await;
        let path = jobs_dir.path().join("a.json");
        write_job(jobs_dir.path(), "a.json", "job-a", "* * * * *");
        reconciler.tick().await;
        std::fs::remove_file(&path).unwrap();
        reconciler.tick().await;
        let state = reconciler.state.lock().await;
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn invalid_file_does_not_abort_tick() {
        let (reconciler, jobs_dir, _log_dir) = test_reconciler().await;
        write_job(jobs_dir.path(), "good.json", "job-a", "* * * * *");
        std::fs::write(jobs_dir.path().join("bad.json"), "not json").unwrap();
        reconciler.tick().await;
        let state = reconciler.state.lock().await;
        assert_eq!(state.len(), 1);
    }
}
