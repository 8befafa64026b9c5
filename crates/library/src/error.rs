//! Workbench Error Types

use derive_more::{Display, Error};
use tabula_cache::error::ErrorKind as CacheErrorKind;
use tabula_storage::error::ErrorKind as StorageErrorKind;

/// A workbench error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for workbench operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration could not be turned into a table or pipeline.
    #[display("invalid workbench configuration")]
    Config,
    /// No item with this key in the table's current snapshot.
    #[display("no item with key {_0}")]
    UnknownItem(#[error(not(source))] String),
    #[display("{_0} has no download reference")]
    NoDownload(#[error(not(source))] String),
    /// Refreshing the item listing failed; the table keeps its previous rows.
    #[display("{_0}")]
    Refresh(#[error(not(source))] CacheErrorKind),
    /// A request to the dataset service failed.
    #[display("{operation} failed: {kind}")]
    Remote { operation: &'static str, kind: StorageErrorKind },
    /// The workbench was torn down before the request completed.
    #[display("workbench closed")]
    Closed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Refresh(kind) => kind.is_retryable(),
            Self::Remote { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }
}
