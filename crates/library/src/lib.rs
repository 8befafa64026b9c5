//! The dataset workbench.
//!
//! A [`Workbench`] owns one of everything: the repository cache, the table
//! view over its snapshots, the upload pipeline and the refresh channel that
//! ties uploads and deletes back to the cache. The embedding UI plugs in as a
//! [`Host`] and is told about row actions, selection changes and rejected
//! uploads.

pub mod error;
mod host;
mod workbench;

pub use crate::host::{Headless, Host, RowAction};
pub use crate::workbench::Workbench;
