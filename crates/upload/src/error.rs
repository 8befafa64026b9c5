//! Upload Error Types
//!
//! Validation failures are not errors in this sense: they are reported per
//! file through [`ValidationError`](crate::ValidationError) and never reach
//! the network. Failed uploads are recorded on their task, not raised.

use crate::task::{Status, TaskId};
use derive_more::{Display, Error};
use std::path::PathBuf;

/// An upload error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for upload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A local file could not be read into memory.
    #[display("failed to read {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    #[display("task {task} cannot {action} while {from}")]
    InvalidTransition { task: TaskId, from: Status, action: &'static str },
    #[display("no upload task {_0}")]
    UnknownTask(#[error(not(source))] TaskId),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}
