//! Job Definition Parser.
//!
//! Validates and loads a single job file into an in-memory [`JobDefinition`].
//! Schedule classification is deliberately *not* done here — see
//! [`crate::schedule`] — so that a uniform `INVALID_SCHEDULE` event can be
//! reported regardless of which field failed.

use chronoflow_core::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;

/// A validation failure, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The file could not be read as UTF-8.
    Io { path: String, reason: String },
    /// The file's top level was not a JSON object.
    NotAnObject { path: String },
    /// The file's JSON was malformed.
    MalformedJson { path: String, reason: String },
    /// A required field was missing or had the wrong shape.
    InvalidField {
        path: String,
        field: &'static str,
        reason: String,
    },
    /// `task.type` named a variant with no registered parser.
    UnknownTaskType { path: String, task_type: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "{path}: could not read file: {reason}"),
            Self::NotAnObject { path } => write!(f, "{path}: job file must be a JSON object"),
            Self::MalformedJson { path, reason } => {
                write!(f, "{path}: malformed JSON: {reason}")
            }
            Self::InvalidField {
                path,
                field,
                reason,
            } => write!(f, "{path}: field `{field}` invalid: {reason}"),
            Self::UnknownTaskType { path, task_type } => {
                write!(f, "{path}: unknown task type `{task_type}`")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// A task descriptor. Today only `execute_command` exists; adding a
/// variant requires a new executor for it and a new parser branch here,
/// with no change to the Scheduler Core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskDescriptor {
    /// Run a shell command.
    ExecuteCommand { command: String },
}

impl TaskDescriptor {
    /// A short label for tracing/event fields (`"execute_command"`, ...).
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::ExecuteCommand { .. } => "execute_command",
        }
    }
}

/// A validated job definition, loaded from one job file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schedule: String,
    pub task: TaskDescriptor,
}

impl JobDefinition {
    /// Reads and validates a job file from disk.
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let path_str = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| ValidationError::Io {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;
        Self::parse(&contents, &path_str)
    }

    /// Validates a job definition from an already-read string.
    ///
    /// Split out from [`Self::load`] so tests can exercise parsing without
    /// touching the filesystem.
    pub fn parse(contents: &str, path_str: &str) -> Result<Self, ValidationError> {
        let value: JsonValue =
            serde_json::from_str(contents).map_err(|e| ValidationError::MalformedJson {
                path: path_str.to_string(),
                reason: e.to_string(),
            })?;
        let object = value.as_object().ok_or_else(|| ValidationError::NotAnObject {
            path: path_str.to_string(),
        })?;

        let job_id_raw = object
            .get("job_id")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ValidationError::InvalidField {
                path: path_str.to_string(),
                field: "job_id",
                reason: "must be a non-empty string".to_string(),
            })?;
        let job_id = JobId::new(job_id_raw).map_err(|e| ValidationError::InvalidField {
            path: path_str.to_string(),
            field: "job_id",
            reason: e.to_string(),
        })?;

        let description = object
            .get("description")
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ValidationError::InvalidField {
                        path: path_str.to_string(),
                        field: "description",
                        reason: "must be a string".to_string(),
                    })
            })
            .transpose()?;

        let schedule = object
            .get("schedule")
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ValidationError::InvalidField {
                path: path_str.to_string(),
                field: "schedule",
                reason: "must be a non-empty string".to_string(),
            })?
            .to_string();

        let task_value = object
            .get("task")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| ValidationError::InvalidField {
                path: path_str.to_string(),
                field: "task",
                reason: "must be an object".to_string(),
            })?;
        let task_type = task_value
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ValidationError::InvalidField {
                path: path_str.to_string(),
                field: "task.type",
                reason: "must be a string".to_string(),
            })?;

        let task = match task_type {
            "execute_command" => {
                let command = task_value
                    .get("command")
                    .and_then(JsonValue::as_str)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ValidationError::InvalidField {
                        path: path_str.to_string(),
                        field: "task.command",
                        reason: "must be a non-empty string".to_string(),
                    })?
                    .to_string();
                TaskDescriptor::ExecuteCommand { command }
            }
            other => {
                return Err(ValidationError::UnknownTaskType {
                    path: path_str.to_string(),
                    task_type: other.to_string(),
                });
            }
        };

        Ok(JobDefinition {
            job_id,
            description,
            schedule,
            task,
        })
    }

    /// Serializes back to the job file's JSON shape, for the round-trip
    /// invariant: load → write → reload yields an equivalent definition.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_job(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_valid_execute_command_job() {
        let json = r#"{
            "job_id": "nightly-backup",
            "description": "runs nightly",
            "schedule": "0 2 * * *",
            "task": {"type": "execute_command", "command": "echo hi"}
        }"#;
        let job = JobDefinition::parse(json, "test.json").unwrap();
        assert_eq!(job.job_id.as_str(), "nightly-backup");
        assert_eq!(job.description.as_deref(), Some("runs nightly"));
        assert_eq!(job.schedule, "0 2 * * *");
        assert_eq!(
            job.task,
            TaskDescriptor::ExecuteCommand {
                command: "echo hi".to_string()
            }
        );
    }

    #[test]
    fn ignores_unknown_top_level_fields() {
        let json = r#"{
            "job_id": "x",
            "schedule": "* * * * *",
            "task": {"type": "execute_command", "command": "true"},
            "owner": "nobody"
        }"#;
        assert!(JobDefinition::parse(json, "test.json").is_ok());
    }

    #[test]
    fn rejects_empty_job_id() {
        let json = r#"{"job_id": "", "schedule": "* * * * *", "task": {"type": "execute_command", "command": "true"}}"#;
        let err = JobDefinition::parse(json, "test.json").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidField { field: "job_id", .. }
        ));
    }

    #[test]
    fn rejects_empty_schedule() {
        let json = r#"{"job_id": "x", "schedule": "", "task": {"type": "execute_command", "command": "true"}}"#;
        let err = JobDefinition::parse(json, "test.json").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidField { field: "schedule", .. }
        ));
    }

    #[test]
    fn rejects_empty_command() {
        let json = r#"{"job_id": "x", "schedule": "* * * * *", "task": {"type": "execute_command", "command": ""}}"#;
        let err = JobDefinition::parse(json, "test.json").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidField {
                field: "task.command",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_task_type() {
        let json = r#"{"job_id": "x", "schedule": "* * * * *", "task": {"type": "send_email"}}"#;
        let err = JobDefinition::parse(json, "test.json").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownTaskType { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = JobDefinition::parse("not json", "test.json").unwrap_err();
        assert!(matches!(err, ValidationError::MalformedJson { .. }));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_job(
            &dir,
            "job.json",
            r#"{"job_id": "x", "schedule": "* * * * *", "task": {"type": "execute_command", "command": "true"}}"#,
        );
        assert!(JobDefinition::load(&path).is_ok());
    }

    #[test]
    fn round_trips_through_json() {
        let json = r#"{
            "job_id": "nightly-backup",
            "schedule": "0 2 * * *",
            "task": {"type": "execute_command", "command": "echo hi"}
        }"#;
        let job = JobDefinition::parse(json, "test.json").unwrap();
        let rewritten = job.to_json_string().unwrap();
        let reloaded = JobDefinition::parse(&rewritten, "test.json").unwrap();
        assert_eq!(job, reloaded);
    }
}
