//! Strongly-typed ID types for scheduler domain entities.
//!
//! [`ExecutionId`] is generated (ULID-backed, for uniqueness and temporal
//! ordering). [`JobId`] is not generated — it is taken verbatim from a
//! job file's `job_id` field, so it only validates non-emptiness.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when a `job_id` fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidJobId {
    /// The rejected value.
    pub value: String,
}

impl fmt::Display for InvalidJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job_id must be non-empty, got {:?}", self.value)
    }
}

impl std::error::Error for InvalidJobId {}

/// The identifier a job file declares for itself.
///
/// Must be non-empty and is expected to be stable for the lifetime of the
/// source file that declares it; the scheduler does not otherwise enforce
/// a format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Validates and wraps a raw `job_id` string.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidJobId> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(InvalidJobId { value: raw });
        }
        Ok(Self(raw))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Error returned when parsing an [`ExecutionId`] from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Opaque unique token identifying one execution attempt.
///
/// ULID-backed so tokens sort in creation order, which makes
/// `ls <log_root>/<job_id>/` produce execution logs in chronological
/// order for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Ulid);

impl ExecutionId {
    /// Creates a new ID with a randomly generated ULID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exec_{}", self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid_str = s.strip_prefix("exec_").unwrap_or(s);
        Ulid::from_str(ulid_str).map(Self).map_err(|e| ParseIdError {
            id_type: "ExecutionId",
            reason: e.to_string(),
        })
    }
}
