//! Error types for system startup and shutdown.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SystemError {
    /// A background task panicked or was aborted.
    #[error("Task {task} failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },

    /// A background task did not stop within the shutdown timeout.
    #[error("Task {0} did not stop in time")]
    ShutdownTimeout(&'static str),
}
