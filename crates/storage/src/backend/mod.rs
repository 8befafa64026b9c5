//! Dataset backend trait and implementations.
//!
//! This module defines the [`DatasetBackend`] trait, the unified interface to
//! the remote dataset service: listing what is stored, uploading new files,
//! deleting items and triggering server-side preprocessing.

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "http")]
pub use self::http::HttpBackend;
#[cfg(feature = "mock")]
pub use self::mock::{Call, ListGate, MockBackend, UploadGate};
use crate::auth::Token;
use crate::error::Result;
use crate::models::{PreprocessReport, PreviewRow, RawItem, UploadReceipt};
use async_trait::async_trait;

/// Unified interface to the remote dataset service.
///
/// Every operation takes the caller's bearer token explicitly. `None` means
/// the request is sent without an `Authorization` header; whether that is
/// acceptable is the server's call, not the backend's.
///
/// # Examples
///
/// ```no_run
/// use tabula_storage::{DatasetBackend, Token, normalize_all, error::Result};
///
/// async fn count_csv_files(backend: &dyn DatasetBackend, token: &Token) -> Result<usize> {
///     let items = normalize_all(backend.list(Some(token)).await?);
///     Ok(items.iter().filter(|item| item.kind.as_str() == "csv").count())
/// }
/// ```
#[async_trait]
pub trait DatasetBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// List every item visible to the token, in the server's order.
    ///
    /// Records are returned raw; run them through
    /// [`normalize_all`](crate::normalize_all) before use.
    async fn list(&self, token: Option<&Token>) -> Result<Vec<RawItem>>;

    /// Upload one file as a multipart body (field name `file`).
    async fn upload(&self, token: Option<&Token>, file_name: &str, data: Vec<u8>) -> Result<UploadReceipt>;

    /// Delete the item stored under `key`.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if there is
    /// nothing to delete.
    async fn delete(&self, token: Option<&Token>, key: &str) -> Result<()>;

    /// Ask the server to profile a dataset (missing values, column types,
    /// summary statistics).
    async fn begin_preprocessing(&self, token: Option<&Token>, dataset_id: &str) -> Result<PreprocessReport>;

    /// Fetch the first rows of a dataset.
    async fn top_rows(
        &self,
        token: Option<&Token>,
        dataset_id: &str,
        target_column: Option<&str>,
    ) -> Result<Vec<PreviewRow>>;
}
