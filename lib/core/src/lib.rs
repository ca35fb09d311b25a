//! Core domain types and error handling shared across the chronoflow
//! scheduler crates.

pub mod error;
pub mod id;
pub mod model;
pub mod observer;

pub use error::Result;
pub use id::{ExecutionId, InvalidJobId, JobId, ParseIdError};
pub use model::{
    CapturedStream, ExecutionRecord, ExecutionStatus, ScheduleEvent, EXIT_CODE_SPAWN_FAILURE,
    EXIT_CODE_TIMEOUT, MAX_CAPTURED_STREAM_BYTES,
};
pub use observer::{FanOutObserver, NoopObserver, Observer};
