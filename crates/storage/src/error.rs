//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never completed (connection refused, timeout, DNS, ...).
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The bearer token is missing, invalid or expired (HTTP 401).
    #[display("not authenticated")]
    Unauthorized,
    /// The token is valid but the item belongs to someone else (HTTP 403).
    #[display("forbidden: {_0}")]
    Forbidden(#[error(not(source))] String),
    /// The item does not exist (HTTP 404).
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Any other non-2xx response, carrying the server's human-readable detail.
    #[display("server error ({status}): {detail}")]
    Server { status: u16, detail: String },
    /// A 2xx response whose body could not be decoded.
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl ErrorKind {
    /// Classify a non-2xx HTTP status and its (already extracted) detail.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden(detail),
            404 => Self::NotFound(detail),
            _ => Self::Server { status, detail },
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the session needs a fresh token before retrying.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(401, ErrorKind::Unauthorized)]
    #[case(403, ErrorKind::Forbidden("Not your dataset".to_string()))]
    #[case(404, ErrorKind::NotFound("Not your dataset".to_string()))]
    #[case(500, ErrorKind::Server { status: 500, detail: "Not your dataset".to_string() })]
    #[case(400, ErrorKind::Server { status: 400, detail: "Not your dataset".to_string() })]
    fn test_from_status(#[case] status: u16, #[case] expected: ErrorKind) {
        assert_eq!(ErrorKind::from_status(status, "Not your dataset"), expected);
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Network("timed out".to_string()).is_retryable());
        assert!(ErrorKind::from_status(502, "bad gateway").is_retryable());
        assert!(!ErrorKind::from_status(400, "Only CSV files are supported").is_retryable());
        assert!(!ErrorKind::Unauthorized.is_retryable());
        assert!(ErrorKind::Unauthorized.is_auth());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ErrorKind::from_status(400, "Only CSV files are supported").to_string(),
            "server error (400): Only CSV files are supported"
        );
        assert_eq!(ErrorKind::Unauthorized.to_string(), "not authenticated");
    }
}
