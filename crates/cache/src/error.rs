//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// Either way the repository keeps serving its previous snapshot.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The listing request could not be completed; the underlying storage
    /// error is attached as the cause.
    #[display("failed to fetch items from {_0}")]
    Fetch(#[error(not(source))] String),
    /// The session's token was rejected. Fetching again is pointless until a
    /// new one is supplied.
    #[display("session token rejected by {_0}")]
    Unauthorized(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
