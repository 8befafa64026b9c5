//! Remote dataset storage for tabula.
//!
//! This crate owns everything that talks to (or pretends to be) the remote
//! dataset service:
//!
//! - the [`DatasetBackend`] trait and its implementations (HTTP behind the
//!   `http` feature, in-memory behind the `mock` feature),
//! - the canonical [`RemoteItem`] model plus the [normalizer](normalize) that
//!   turns heterogeneous listing records into it,
//! - the bearer-token [`Session`] that gates every network operation.

mod auth;
pub mod backend;
pub mod error;
mod models;
pub mod normalize;

pub use crate::auth::{Session, Token};
pub use crate::backend::DatasetBackend;
pub use crate::models::{Kind, PreprocessReport, PreviewRow, RawItem, RemoteItem, UploadReceipt};
pub use crate::normalize::{normalize, normalize_all};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn DatasetBackend + Send + Sync>;
