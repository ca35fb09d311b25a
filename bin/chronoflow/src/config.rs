//! Config Loader.
//!
//! Assembles a [`RuntimeConfig`] from environment variables with CLI-flag
//! overrides, then validates it as a whole. A failure here is a startup
//! failure: nothing starts until this succeeds.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

fn default_jobs_dir() -> String {
    "/etc/chronoflow/jobs.d".to_string()
}
fn default_log_dir() -> String {
    "/var/log/chronoflow".to_string()
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_max_concurrent_jobs() -> u32 {
    10
}
fn default_job_timeout_seconds() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_base_seconds() -> u64 {
    5
}
fn default_scheduler_check_interval_seconds() -> u64 {
    1
}
fn default_watcher_poll_interval_seconds() -> u64 {
    2
}

/// The Runtime Configuration value type: immutable, `Clone`-able, and
/// handed to the Scheduler Core, Directory Reconciler, and Task Executor
/// once validated.
///
/// Field names favor clarity (`job_timeout_seconds` over `JOB_TIMEOUT`'s
/// implied unit); `serde(alias = ...)` binds the shorter external
/// environment variable names onto them.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
    #[serde(alias = "job_timeout", default = "default_job_timeout_seconds")]
    pub job_timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(alias = "retry_delay", default = "default_retry_delay_base_seconds")]
    pub retry_delay_base_seconds: u64,
    #[serde(
        alias = "scheduler_check_interval",
        default = "default_scheduler_check_interval_seconds"
    )]
    pub scheduler_check_interval_seconds: u64,
    #[serde(
        alias = "watcher_poll_interval",
        default = "default_watcher_poll_interval_seconds"
    )]
    pub watcher_poll_interval_seconds: u64,
}

/// CLI-flag overrides, layered on top of the environment.
#[derive(Debug, Clone, Default, clap::Parser)]
#[command(name = "chronoflow", about = "Directory-driven job scheduler")]
pub struct CliArgs {
    /// Directory to watch for job definition files.
    #[arg(long)]
    pub jobs_dir: Option<PathBuf>,

    /// Minimum log level to emit.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevelArg>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevelArg {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevelArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// A validation failure in the assembled configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Load { reason: String },
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { reason } => write!(f, "failed to load configuration: {reason}"),
            Self::Invalid { field, reason } => {
                write!(f, "invalid configuration field `{field}`: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl RuntimeConfig {
    /// Loads from the process environment, applies `cli` overrides, and
    /// validates the result.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Environment::default());

        if let Some(jobs_dir) = &cli.jobs_dir {
            builder = builder
                .set_override("jobs_dir", jobs_dir.display().to_string())
                .map_err(|e| ConfigError::Load {
                    reason: e.to_string(),
                })?;
        }
        if let Some(log_level) = cli.log_level {
            builder = builder
                .set_override("log_level", log_level.to_string())
                .map_err(|e| ConfigError::Load {
                    reason: e.to_string(),
                })?;
        }

        let config = builder.build().map_err(|e| ConfigError::Load {
            reason: e.to_string(),
        })?;
        let runtime: RuntimeConfig = config.try_deserialize().map_err(|e| ConfigError::Load {
            reason: e.to_string(),
        })?;
        runtime.validate()?;
        Ok(runtime)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs_dir.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "jobs_dir",
                reason: "must not be empty".to_string(),
            });
        }
        if !matches!(
            self.log_level.to_ascii_uppercase().as_str(),
            "DEBUG" | "INFO" | "WARNING" | "ERROR"
        ) {
            return Err(ConfigError::Invalid {
                field: "log_level",
                reason: format!("must be one of DEBUG, INFO, WARNING, ERROR, got {:?}", self.log_level),
            });
        }
        if self.max_concurrent_jobs < 1 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_jobs",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.job_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "job_timeout_seconds",
                reason: "must be > 0".to_string(),
            });
        }
        if self.retry_delay_base_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "retry_delay_base_seconds",
                reason: "must be > 0".to_string(),
            });
        }
        if self.scheduler_check_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler_check_interval_seconds",
                reason: "must be > 0".to_string(),
            });
        }
        if self.watcher_poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "watcher_poll_interval_seconds",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
