//! CLI Front-End: process entry point. Wires the Config Loader,
//! Event Logger, Scheduler Core, Directory Reconciler, and Task Executor
//! together and runs until an OS shutdown signal arrives.

mod config;

use crate::config::{CliArgs, RuntimeConfig};
use chronoflow_core::NoopObserver;
use chronoflow_executor::{ChronoflowJobRunner, LogWriter, RetryPolicy};
use chronoflow_reconciler::{DirectoryReconciler, ReconcilerConfig};
use chronoflow_scheduler::{EventLogger, SchedulerCore, SchedulerCoreConfig};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Grace period the Scheduler Core waits for its dispatch loop to drain
/// before forcing shutdown.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match RuntimeConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("chronoflow: {e}");
            return ExitCode::from(1);
        }
    };

    init_tracing(&config.log_level);

    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        tracing::error!(error = %e, log_dir = %config.log_dir, "failed to create log directory");
        return ExitCode::from(1);
    }

    let events = match EventLogger::open(Path::new(&config.log_dir)) {
        Ok(events) => Arc::new(events),
        Err(e) => {
            tracing::error!(error = %e, "failed to open event log");
            return ExitCode::from(1);
        }
    };

    let observer: Arc<dyn chronoflow_core::Observer> = Arc::new(NoopObserver);

    let log_writer = Arc::new(LogWriter::new(PathBuf::from(&config.log_dir)));
    let policy = RetryPolicy {
        max_retries: config.max_retries,
        retry_delay_base_seconds: config.retry_delay_base_seconds,
        job_timeout: Duration::from_secs(config.job_timeout_seconds),
    };
    let runner = Arc::new(ChronoflowJobRunner::new(policy, log_writer, Arc::clone(&observer)));

    let core = SchedulerCore::new(
        events,
        observer,
        runner,
        SchedulerCoreConfig {
            tick_interval: Duration::from_secs(config.scheduler_check_interval_seconds),
            max_concurrent_jobs: config.max_concurrent_jobs as usize,
            shutdown_grace_period: SHUTDOWN_GRACE_PERIOD,
        },
    );

    let reconciler = DirectoryReconciler::new(
        ReconcilerConfig {
            jobs_dir: PathBuf::from(&config.jobs_dir),
            poll_interval: Duration::from_secs(config.watcher_poll_interval_seconds),
        },
        Arc::clone(&core),
    );

    core.start().await;
    reconciler.start().await;

    tracing::info!(
        jobs_dir = %config.jobs_dir,
        log_dir = %config.log_dir,
        "chronoflow started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown signal handler");
    }

    tracing::info!("shutdown signal received, draining");
    reconciler.stop().await;
    core.stop().await;

    ExitCode::SUCCESS
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level_to_filter(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn log_level_to_filter(log_level: &str) -> &'static str {
    match log_level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}
