//! Table Error Types

use crate::column::Column;
use derive_more::{Display, Error};

/// A table error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for table operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// All of these are caller mistakes; the table state is left untouched.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("column {_0} cannot be sorted")]
    NotSortable(#[error(not(source))] Column),
    #[display("column {_0} cannot be hidden")]
    NotHideable(#[error(not(source))] Column),
    #[display("no item with key {_0}")]
    UnknownKey(#[error(not(source))] String),
    #[display("page size must be at least 1")]
    InvalidPageSize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
