use derive_more::Display;
use tabula_storage::RemoteItem;
use tabula_upload::{UploadFile, ValidationError};

/// What the embedding UI is told about.
///
/// Every method defaults to doing nothing, so a host only implements the
/// notifications it cares about. Methods are called synchronously from
/// whichever task caused the event and must not block.
pub trait Host: Send + Sync {
    /// The user asked for a dataset to be profiled.
    fn on_analyse(&self, _item: &RemoteItem) {}

    fn on_download(&self, _item: &RemoteItem) {}

    /// The user asked for an item to be deleted. The host decides whether
    /// (and after what confirmation) to call [`Workbench::delete`](crate::Workbench::delete).
    fn on_delete(&self, _item: &RemoteItem) {}

    /// The full selection, in snapshot order, after every change.
    fn on_selection_change(&self, _items: &[RemoteItem]) {}

    /// One call per dropped file that failed validation.
    fn on_upload_error(&self, _file: &UploadFile, _error: &ValidationError) {}
}

/// A host that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl Host for Headless {}

/// The per-row action menu.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowAction {
    #[display("analyse")]
    Analyse,
    #[display("download")]
    Download,
    #[display("delete")]
    Delete,
}
